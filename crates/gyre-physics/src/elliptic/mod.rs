//! The elliptic solver: sparse operators, PCG, and the barotropic and
//! non-hydrostatic pressure problems built on them.

pub mod barotropic;
pub mod pcg;
pub mod pressure;
pub mod stencil;

pub use barotropic::BarotropicOperator;
pub use pcg::Solution;
pub use pressure::PressureOperator;
pub use stencil::{Basins, Stencil, StencilBuilder};
