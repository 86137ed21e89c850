pub use crate::aggregate::{AggregateResult, CombinedTable, Deconvolution};
pub use crate::curve::{CurveConfig, CurvePoint, DenseCurve};
pub use crate::metrics::{CurveMetrics, Fraction, ResolutionEstimate};
pub use crate::mixture::{
    AbortHandle, ElutionTrace, FitConfig, LogNormalPeakShape, MixtureFitter, MixtureParameters,
    ParameterBounds,
};
pub use crate::pipeline::{
    BatchResult, DeconvolutionConfig, ElutionTable, FitResult, FitWarning, SampleColumn,
};
