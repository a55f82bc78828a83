// measure.rs - Per-sample observables derived from the simulator's (m_x, m_y, e) records
use crate::error::{AnalysisError, Result};

/// Values per binary record written by the simulator: m_x, m_y and the energy.
pub const RECORD_WIDTH: usize = 3;

/// Names of the columns a [`MeasurementSeries`] exposes, in output order.
pub const COLUMNS: [&str; 6] = ["mx", "my", "epsilon", "absm", "m2", "m4"];

/// Thermalized time series of one simulation run.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSeries {
    pub mx: Vec<f64>,
    pub my: Vec<f64>,
    pub epsilon: Vec<f64>,
    pub absm: Vec<f64>,
    pub m2: Vec<f64>,
    pub m4: Vec<f64>,
}

impl MeasurementSeries {
    /// Build from rows `[m_x, m_y, e, ...]`, skipping the first `first_index` rows.
    pub fn from_records(records: &[Vec<f64>], first_index: usize) -> Result<Self> {
        if records.len() <= first_index {
            return Err(AnalysisError::invalid(format!(
                "insufficient data after index {} ({} rows)",
                first_index,
                records.len()
            )));
        }
        let mut series = Self::default();
        for row in &records[first_index..] {
            if row.len() < 3 {
                return Err(AnalysisError::mismatch(format!(
                    "record has {} columns, need m_x, m_y and energy",
                    row.len()
                )));
            }
            series.push(row[0], row[1], row[2]);
        }
        Ok(series)
    }

    /// Append one sample and its derived moments.
    pub fn push(&mut self, mx: f64, my: f64, epsilon: f64) {
        let m2 = mx * mx + my * my;
        self.mx.push(mx);
        self.my.push(my);
        self.epsilon.push(epsilon);
        self.absm.push(m2.sqrt());
        self.m2.push(m2);
        self.m4.push(m2 * m2);
    }

    pub fn len(&self) -> usize {
        self.mx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mx.is_empty()
    }

    /// Column by name, see [`COLUMNS`].
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match name {
            "mx" => Some(&self.mx),
            "my" => Some(&self.my),
            "epsilon" => Some(&self.epsilon),
            "absm" => Some(&self.absm),
            "m2" => Some(&self.m2),
            "m4" => Some(&self.m4),
            _ => None,
        }
    }

    /// Energy squared per sample, the second moment for the specific heat.
    pub fn epsilon_squared(&self) -> Vec<f64> {
        self.epsilon.iter().map(|e| e * e).collect()
    }
}
