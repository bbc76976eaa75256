//! Output registration and delivery.
//!
//! The [`OutputRegistry`] lists which fields leave the model, each with
//! its self-description. Every `output_interval` steps the model copies
//! the registered fields into an [`OutputFrame`] and hands it to the
//! configured [`OutputSink`]. Writing files is the sink's business.

use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use gyre_core::{FieldAccess, FieldKey, GridPoint, Rank, StepId};
use gyre_state::PanicSnapshot;
use indexmap::IndexMap;

// ── Registry ───────────────────────────────────────────────────────

/// Self-description of one output variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputVariable {
    /// The field behind the variable.
    pub key: FieldKey,
    /// Variable name.
    pub name: &'static str,
    /// Physical units.
    pub units: &'static str,
    /// Descriptive name.
    pub long_name: &'static str,
    /// Staggering tag.
    pub grid: GridPoint,
    /// Surface or volume field.
    pub rank: Rank,
}

impl From<FieldKey> for OutputVariable {
    fn from(key: FieldKey) -> Self {
        let meta = key.meta();
        Self {
            key,
            name: meta.name,
            units: meta.units,
            long_name: meta.long_name,
            grid: meta.grid,
            rank: meta.rank,
        }
    }
}

/// Ordered set of registered output variables.
#[derive(Clone, Debug, Default)]
pub struct OutputRegistry {
    variables: IndexMap<FieldKey, OutputVariable>,
}

impl OutputRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key`. Returns `false` if it was already registered.
    pub fn register(&mut self, key: FieldKey) -> bool {
        if self.variables.contains_key(&key) {
            return false;
        }
        self.variables.insert(key, OutputVariable::from(key));
        true
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: FieldKey) -> bool {
        self.variables.contains_key(&key)
    }

    /// Registered variables in registration order.
    pub fn variables(&self) -> impl Iterator<Item = &OutputVariable> {
        self.variables.values()
    }

    /// Number of registered variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Copy every registered field out of `source`.
    ///
    /// Fields the source does not hold are skipped.
    pub fn frame(&self, step: StepId, time: f64, source: &dyn FieldAccess) -> OutputFrame {
        let fields = self
            .variables
            .values()
            .filter_map(|var| {
                source.field(var.key).map(|data| OutputField {
                    variable: var.clone(),
                    data: data.to_vec(),
                })
            })
            .collect();
        OutputFrame { step, time, fields }
    }
}

// ── Frames ─────────────────────────────────────────────────────────

/// One field copied into a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputField {
    /// Self-description.
    pub variable: OutputVariable,
    /// Values including halo cells, in grid storage order.
    pub data: Vec<f64>,
}

/// Read-only copies of the registered fields after a completed step.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputFrame {
    /// The completed step.
    pub step: StepId,
    /// Model time after the step, s.
    pub time: f64,
    /// Fields in registration order.
    pub fields: Vec<OutputField>,
}

impl OutputFrame {
    /// The copied data of `key`, if it is in the frame.
    pub fn get(&self, key: FieldKey) -> Option<&[f64]> {
        self.fields
            .iter()
            .find(|f| f.variable.key == key)
            .map(|f| f.data.as_slice())
    }
}

// ── Sinks ──────────────────────────────────────────────────────────

/// Consumer of output frames and panic snapshots.
pub trait OutputSink: Send {
    /// Receive a frame.
    fn frame(&mut self, frame: OutputFrame);

    /// Receive the snapshot of a failed step.
    fn panic(&mut self, snapshot: &PanicSnapshot);
}

#[derive(Debug, Default)]
struct MemoryInner {
    frames: Vec<OutputFrame>,
    panics: Vec<PanicSnapshot>,
}

/// Keeps everything in memory. Clones share the same storage, so a test
/// can keep one handle and give the other to the model.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Frames received so far.
    pub fn frames(&self) -> Vec<OutputFrame> {
        self.lock().frames.clone()
    }

    /// Panic snapshots received so far.
    pub fn panics(&self) -> Vec<PanicSnapshot> {
        self.lock().panics.clone()
    }
}

impl OutputSink for MemorySink {
    fn frame(&mut self, frame: OutputFrame) {
        self.lock().frames.push(frame);
    }

    fn panic(&mut self, snapshot: &PanicSnapshot) {
        self.lock().panics.push(snapshot.clone());
    }
}

/// Message sent by a [`ChannelSink`].
#[derive(Debug)]
pub enum OutputMessage {
    /// A regular output frame.
    Frame(OutputFrame),
    /// The state captured when a step failed.
    Panic(Box<PanicSnapshot>),
}

/// Forwards frames to an I/O thread over a bounded channel.
///
/// A full channel blocks the model until the writer catches up; frames are
/// never dropped while the receiver is alive.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<OutputMessage>,
}

impl ChannelSink {
    /// A sink with room for `capacity` unread messages, and its receiver.
    pub fn bounded(capacity: usize) -> (Self, Receiver<OutputMessage>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }

    fn send(&self, msg: OutputMessage) {
        let msg = match self.tx.try_send(msg) {
            Ok(()) => return,
            Err(TrySendError::Full(msg)) => msg,
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("output receiver disconnected; message dropped");
                return;
            }
        };
        log::debug!("output channel full; waiting for the writer");
        if self.tx.send(msg).is_err() {
            log::warn!("output receiver disconnected; message dropped");
        }
    }
}

impl OutputSink for ChannelSink {
    fn frame(&mut self, frame: OutputFrame) {
        self.send(OutputMessage::Frame(frame));
    }

    fn panic(&mut self, snapshot: &PanicSnapshot) {
        self.send(OutputMessage::Panic(Box::new(snapshot.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_grid::GridBuilder;
    use gyre_state::{Allocation, ModelState};

    fn state() -> ModelState {
        let grid = GridBuilder::new(2, 2, 2).build().unwrap();
        let mut state = ModelState::new(&grid, Allocation::default());
        let lv = state.levels;
        state.temp.slot_mut(lv.current()).fill(12.0);
        state
    }

    #[test]
    fn registry_keeps_order_and_metadata() {
        let mut reg = OutputRegistry::new();
        assert!(reg.register(FieldKey::Temp));
        assert!(reg.register(FieldKey::KappaM));
        assert!(!reg.register(FieldKey::Temp));
        let vars: Vec<_> = reg.variables().collect();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "temp");
        assert_eq!(vars[0].units, "deg C");
        assert_eq!(vars[1].grid, GridPoint::W);
    }

    #[test]
    fn frame_skips_unallocated_fields() {
        let mut reg = OutputRegistry::new();
        reg.register(FieldKey::Temp);
        reg.register(FieldKey::Tke);
        let frame = reg.frame(StepId(3), 30.0, &state());
        assert_eq!(frame.fields.len(), 1);
        assert!(frame.get(FieldKey::Temp).unwrap().iter().all(|&t| t == 12.0));
        assert!(frame.get(FieldKey::Tke).is_none());
    }

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let mut handle: Box<dyn OutputSink> = Box::new(sink.clone());
        let reg = OutputRegistry::new();
        handle.frame(reg.frame(StepId(1), 1.0, &state()));
        handle.panic(&PanicSnapshot::capture(&state(), "tracer"));
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.panics()[0].stage, "tracer");
    }

    #[test]
    fn channel_sink_delivers_in_order() {
        let (mut sink, rx) = ChannelSink::bounded(4);
        let reg = OutputRegistry::new();
        let s = state();
        sink.frame(reg.frame(StepId(1), 1.0, &s));
        sink.frame(reg.frame(StepId(2), 2.0, &s));
        sink.panic(&PanicSnapshot::capture(&s, "momentum"));
        let steps: Vec<String> = rx
            .try_iter()
            .map(|m| match m {
                OutputMessage::Frame(f) => format!("frame {}", f.step),
                OutputMessage::Panic(p) => format!("panic {}", p.stage),
            })
            .collect();
        assert_eq!(steps, ["frame 1", "frame 2", "panic momentum"]);
    }

    #[test]
    fn channel_sink_survives_a_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        drop(rx);
        sink.frame(OutputRegistry::new().frame(StepId(1), 1.0, &state()));
    }
}
