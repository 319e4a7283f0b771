use std::io::Write;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A period x supplier table of quantities, one row per period
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSupplierMatrix {
    suppliers: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl PeriodSupplierMatrix {
    pub fn zeros(suppliers: Vec<String>, horizon: usize) -> Self {
        let width = suppliers.len();
        Self {
            suppliers,
            rows: vec![vec![0.0; width]; horizon],
        }
    }

    pub fn horizon(&self) -> usize {
        self.rows.len()
    }

    pub fn suppliers(&self) -> &[String] {
        &self.suppliers
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn supplier_index(&self, supplier: &str) -> Option<usize> {
        self.suppliers.iter().position(|s| s == supplier)
    }

    /// Value at a period for a supplier id, if both exist
    pub fn get(&self, period: usize, supplier: &str) -> Option<f64> {
        let s = self.supplier_index(supplier)?;
        self.rows.get(period).map(|row| row[s])
    }

    pub fn get_at(&self, period: usize, supplier: usize) -> f64 {
        self.rows[period][supplier]
    }

    pub fn set(&mut self, period: usize, supplier: usize, value: f64) {
        self.rows[period][supplier] = value;
    }

    pub fn add(&mut self, period: usize, supplier: usize, value: f64) {
        self.rows[period][supplier] += value;
    }

    pub fn column(&self, supplier: &str) -> Option<Vec<f64>> {
        let s = self.supplier_index(supplier)?;
        Some(self.rows.iter().map(|row| row[s]).collect())
    }

    /// Sum over suppliers for each period
    pub fn period_totals(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn total(&self) -> f64 {
        self.rows.iter().flatten().sum()
    }

    /// Every cell as (period, supplier index, value)
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(t, row)| row.iter().enumerate().map(move |(s, &v)| (t, s, v)))
    }

    /// Write as CSV: a `period` column followed by one column per supplier
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), MatrixError> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["period".to_string()];
        header.extend(self.suppliers.iter().cloned());
        wtr.write_record(&header)?;

        for (t, row) in self.rows.iter().enumerate() {
            let mut record = vec![t.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}
