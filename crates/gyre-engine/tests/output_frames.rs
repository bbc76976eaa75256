//! Integration tests: output frames and periodic diagnostics.

use std::thread;

use gyre_core::{FieldKey, NoForcing, SteadyForcing, StepId};
use gyre_engine::{ChannelSink, MemorySink, Model, ModelConfig, OutputMessage};
use gyre_test_utils::{channel, closed_basin, stratified_state, uniform_wind};

fn model(cfg: ModelConfig) -> Model {
    let grid = closed_basin(5, 4, 3);
    let state = stratified_state(&grid, cfg.allocation(), 16.0, 3.0);
    Model::with_state(grid, cfg, state).unwrap()
}

#[test]
fn frames_arrive_at_the_output_interval() {
    let mut model = model(ModelConfig {
        dt: 600.0,
        output_interval: 2,
        ..ModelConfig::default()
    });
    let sink = MemorySink::new();
    model.set_output_sink(Box::new(sink.clone()));
    assert!(model.register_output(FieldKey::Temp));
    assert!(model.register_output(FieldKey::U));
    assert!(!model.register_output(FieldKey::Temp));
    assert!(!model.register_output(FieldKey::Tke));
    assert_eq!(model.outputs().len(), 2);

    model.run(&NoForcing, 5).unwrap();

    let frames = sink.frames();
    let steps: Vec<StepId> = frames.iter().map(|f| f.step).collect();
    assert_eq!(steps, [StepId(2), StepId(4)]);
    assert_eq!(frames[1].time, 2400.0);
    assert_eq!(frames[0].fields.len(), 2);
    assert_eq!(frames[0].fields[0].variable.name, "temp");
    assert!(sink.panics().is_empty());

    let cells = model.grid().shape().cells();
    assert_eq!(frames[1].get(FieldKey::Temp).map(<[f64]>::len), Some(cells));
}

#[test]
fn a_reader_thread_drains_the_channel() {
    let mut model = model(ModelConfig {
        dt: 600.0,
        output_interval: 1,
        ..ModelConfig::default()
    });
    model.register_output(FieldKey::Salt);
    let (sink, rx) = ChannelSink::bounded(2);
    model.set_output_sink(Box::new(sink));

    let reader = thread::spawn(move || {
        let mut steps = Vec::new();
        for msg in rx {
            if let OutputMessage::Frame(frame) = msg {
                assert!(frame.get(FieldKey::Salt).is_some());
                steps.push(frame.step.0);
            }
        }
        steps
    });

    model.run(&NoForcing, 6).unwrap();
    drop(model);

    assert_eq!(reader.join().unwrap(), [1, 2, 3, 4, 5, 6]);
}

#[test]
fn diagnostics_are_reported_at_their_interval() {
    let grid = channel(8, 6, 4);
    let cfg = ModelConfig {
        dt: 600.0,
        diagnostics_interval: 3,
        ..ModelConfig::default()
    };
    let state = stratified_state(&grid, cfg.allocation(), 18.0, 4.0);
    let columns = grid.shape().columns();
    let mut model = Model::with_state(grid, cfg, state).unwrap();
    let wind = SteadyForcing::new(uniform_wind(columns, 1e-4));

    let mut reports = Vec::new();
    for _ in 0..6 {
        reports.push(model.advance_one_step(&wind).unwrap());
    }

    let with_tracers: Vec<u64> = reports
        .iter()
        .filter(|r| r.tracers.is_some())
        .map(|r| r.step.0)
        .collect();
    assert_eq!(with_tracers, [3, 6]);
    assert!(reports.iter().all(|r| r.tracers.is_some() == r.energy.is_some()));
    assert!(reports.iter().all(|r| r.overturning.is_some() == r.energy.is_some()));

    let first = reports[2].tracers.unwrap();
    assert!(first.temp_change.is_none());
    assert!(first.temp.mean > 4.0 && first.temp.mean < 18.0);
    assert!(first.temp.variance > 0.0);

    let second = reports[5].tracers.unwrap();
    let change = second.temp_change.unwrap();
    assert!(change.mean.abs() < 1e-10 * second.temp.mean);

    let ovt = reports[5].overturning.as_ref().unwrap();
    assert_eq!(ovt.rows(), 6);
    assert!(ovt.max_abs().is_finite());
    assert!(ovt.bolus_depth(0, 0).is_none());

    let energy = reports[5].energy.unwrap();
    assert!(energy.kinetic > 0.0);
    assert_eq!(energy.closures(), 0.0);

    // Every stage shows up in the timings of every step.
    for r in &reports {
        assert_eq!(r.metrics.stage_us.len(), model.stage_names().len());
    }
    assert!(reports.iter().any(|r| r.barotropic_iterations > 0));
}
