//! Bookkeeping for energy handed between closures.
//!
//! Every term that leaves one energy budget and enters another is recorded
//! twice per step: once as the domain integral the sender removed, once as
//! the integral the receiver injected. A mismatch means a sign error, a
//! missing mask or a non-conservative remap somewhere on the route.

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

/// A directed energy route between two budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferRoute {
    /// Vertical shear dissipation (`K_diss_v`) into TKE.
    ShearToTke,
    /// Buoyancy flux (`P_diss_v`) out of TKE.
    BuoyancyToTke,
    /// Lateral friction (`K_diss_h`) into EKE.
    LateralFrictionToEke,
    /// Release of available potential energy (`P_diss_skew`) into EKE.
    SkewFluxToEke,
    /// EKE dissipation into internal waves.
    EkeToIdemix,
    /// EKE dissipation into TKE.
    EkeToTke,
    /// EKE lost to lee waves, injected at the IDEMIX bottom.
    LeeWavesToIdemix,
    /// Internal-wave dissipation into TKE.
    IdemixToTke,
    /// Bottom and Rayleigh drag (`K_diss_bot`) into TKE.
    BottomFrictionToTke,
    /// Bottom and Rayleigh drag (`K_diss_bot`) into internal waves.
    BottomFrictionToIdemix,
    /// Decay of the M2 band into the IDEMIX bottom cell.
    TidalBandToIdemix,
    /// Decay of the near-inertial band into the IDEMIX surface cell.
    NearInertialBandToIdemix,
}

impl fmt::Display for TransferRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ShearToTke => "K_diss_v -> tke",
            Self::BuoyancyToTke => "P_diss_v -> tke",
            Self::LateralFrictionToEke => "K_diss_h -> eke",
            Self::SkewFluxToEke => "P_diss_skew -> eke",
            Self::EkeToIdemix => "eke -> E_iw",
            Self::EkeToTke => "eke -> tke",
            Self::LeeWavesToIdemix => "eke lee waves -> E_iw",
            Self::IdemixToTke => "E_iw -> tke",
            Self::BottomFrictionToTke => "K_diss_bot -> tke",
            Self::BottomFrictionToIdemix => "K_diss_bot -> E_iw",
            Self::TidalBandToIdemix => "E_M2 -> E_iw",
            Self::NearInertialBandToIdemix => "E_niw -> E_iw",
        };
        f.write_str(s)
    }
}

/// Domain-integrated energy rates on one route, in m^5/s^3.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transfer {
    /// Rate removed by the sending budget.
    pub sent: f64,
    /// Rate injected into the receiving budget.
    pub received: f64,
}

impl Transfer {
    /// `sent - received`.
    pub fn imbalance(&self) -> f64 {
        self.sent - self.received
    }
}

/// A route whose two sides disagree beyond the tolerance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferViolation {
    /// The unbalanced route.
    pub route: TransferRoute,
    /// Rate removed by the sender.
    pub sent: f64,
    /// Rate injected into the receiver.
    pub received: f64,
}

impl fmt::Display for TransferViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "energy transfer {} unbalanced: sent {:.6e}, received {:.6e}",
            self.route, self.sent, self.received
        )
    }
}

/// Per-step record of every inter-closure energy transfer.
///
/// Routes keep the order in which they were first recorded, so reports
/// follow the pipeline order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransferLedger {
    routes: IndexMap<TransferRoute, Transfer>,
}

impl TransferLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all routes at the start of a step.
    pub fn reset(&mut self) {
        self.routes.clear();
    }

    /// Add `amount` to the sender side of `route`.
    pub fn record_sent(&mut self, route: TransferRoute, amount: f64) {
        self.routes.entry(route).or_default().sent += amount;
    }

    /// Add `amount` to the receiver side of `route`.
    pub fn record_received(&mut self, route: TransferRoute, amount: f64) {
        self.routes.entry(route).or_default().received += amount;
    }

    /// The transfer recorded on `route`, if any.
    pub fn get(&self, route: TransferRoute) -> Option<Transfer> {
        self.routes.get(&route).copied()
    }

    /// All recorded routes in first-recorded order.
    pub fn iter(&self) -> impl Iterator<Item = (TransferRoute, Transfer)> + '_ {
        self.routes.iter().map(|(r, t)| (*r, *t))
    }

    /// Number of recorded routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes where `|sent - received| > tolerance * max(|sent|, |received|)`.
    ///
    /// Routes where both sides are below `f64::MIN_POSITIVE` are balanced.
    pub fn check(&self, tolerance: f64) -> SmallVec<[TransferViolation; 4]> {
        self.routes
            .iter()
            .filter(|(_, t)| {
                let scale = t.sent.abs().max(t.received.abs());
                scale >= f64::MIN_POSITIVE && t.imbalance().abs() > tolerance * scale
            })
            .map(|(route, t)| TransferViolation {
                route: *route,
                sent: t.sent,
                received: t.received,
            })
            .collect()
    }
}
