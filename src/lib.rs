pub mod error;
pub mod blocking;
pub mod jackknife;
pub mod observables;
pub mod spline;
pub mod derivative;
pub mod fit;
pub mod autocorr;
pub mod measure;
pub mod finite_size;
pub mod io;
pub mod config;
pub mod analysis;
pub mod synthetic;

pub use error::{AnalysisError, Result};
