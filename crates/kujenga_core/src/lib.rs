//! The `kujenga_core` crate is the numerical engine behind the differential
//! equations lessons.
//!
//! Key components:
//! - **Traits**: `DynamicalSystem` (rate functions) and `Steppable` (fixed-step solvers).
//! - **Simulator**: adaptive Tsit5 or fixed-step RK4 integration, sampled at requested times.
//! - **Phase plane**: nullclines (closed form or marching squares) and normalized direction fields.
//! - **Models**: the SIR epidemic and the rabbits-and-foxes predator-prey system.
//! - **Equilibrium**: Newton refinement of steady states and eigenvalue stability.
//! - **Sweep**: independent runs over a list of parameter values on the rayon pool.
pub mod equilibrium;
pub mod error;
pub mod models;
pub mod phase_plane;
pub mod simulator;
pub mod solvers;
pub mod sweep;
pub mod traits;
pub mod trajectory;
pub mod util;

pub use error::{Error, IntegrationError, InvalidInput, RateError, Result};
pub use simulator::{simulate, IntegratorSettings, Method};
pub use traits::{DynamicalSystem, RateFn};
pub use trajectory::Trajectory;
