//! The stages of one model time step, in pipeline order.

mod closure_mixing;
mod eke;
mod exchange;
mod forcing;
mod idemix;
mod momentum;
mod tke;
mod tracer;
mod wgrid;

pub use closure_mixing::ClosureMixing;
pub use eke::EkeStage;
pub use exchange::BoundaryExchange;
pub use forcing::ForcingStage;
pub use idemix::IdemixStage;
pub use momentum::MomentumStage;
pub use tke::TkeStage;
pub use tracer::TracerStage;
pub use wgrid::WGridStage;
