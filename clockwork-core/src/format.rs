//! Tab-delimited trace output.
//!
//! Values are written with six decimals; non-finite values use the literal
//! tokens `NaN`, `Inf` and `-Inf` so that trace readers never see Rust's
//! `inf` spelling.

use std::io::Write;

use crate::traits::Loggable;
use crate::{ClockworkError, Result};

/// Format one trace value.
pub fn fmt_value(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x == f64::INFINITY {
        "Inf".to_string()
    } else if x == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{:.6}", x)
    }
}

/// Writes a header line followed by one line per logged sample.
///
/// The first column is always `Sample`.
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    out: W,
    columns: Option<usize>,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, columns: None }
    }

    /// Write the header line. Must be called exactly once, before any row.
    pub fn write_header(&mut self, columns: &[String]) -> Result<()> {
        if self.columns.is_some() {
            return Err(ClockworkError::Other("trace header already written".into()));
        }
        write!(self.out, "Sample")?;
        for c in columns {
            write!(self.out, "\t{}", c)?;
        }
        writeln!(self.out)?;
        self.columns = Some(columns.len());
        Ok(())
    }

    /// Write one row; `values` must match the header width.
    pub fn write_row(&mut self, sample: u64, values: &[f64]) -> Result<()> {
        let expected = self
            .columns
            .ok_or_else(|| ClockworkError::Other("trace row written before header".into()))?;
        if values.len() != expected {
            return Err(ClockworkError::dimension("trace row", expected, values.len()));
        }
        write!(self.out, "{}", sample)?;
        for &v in values {
            write!(self.out, "\t{}", fmt_value(v))?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Log one sample from `logger`, writing its header first if needed.
    pub fn log<C, L>(&mut self, logger: &mut L, sample: u64, ctx: &C) -> Result<()>
    where
        C: ?Sized,
        L: Loggable<C>,
    {
        if self.columns.is_none() {
            self.write_header(&logger.columns())?;
        }
        let row = logger.row(sample, ctx);
        self.write_row(sample, &row)
    }

    /// Append the logger's close-time summary (if any) and flush.
    pub fn close<C, L>(&mut self, logger: &L) -> Result<()>
    where
        C: ?Sized,
        L: Loggable<C>,
    {
        if let Some(summary) = logger.close_summary() {
            for line in summary.lines() {
                writeln!(self.out, "# {}", line)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Loggable<()> for Fixed {
        fn columns(&self) -> Vec<String> {
            vec!["a".into(), "b".into()]
        }

        fn row(&mut self, _sample: u64, _ctx: &()) -> Vec<f64> {
            vec![1.5, f64::NEG_INFINITY]
        }

        fn close_summary(&self) -> Option<String> {
            Some("done".into())
        }
    }

    #[test]
    fn value_tokens() {
        assert_eq!(fmt_value(f64::NAN), "NaN");
        assert_eq!(fmt_value(f64::INFINITY), "Inf");
        assert_eq!(fmt_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(fmt_value(-9.306852819440055), "-9.306853");
        assert_eq!(fmt_value(0.0), "0.000000");
    }

    #[test]
    fn header_rows_and_summary() {
        let mut w = TraceWriter::new(Vec::new());
        let mut logger = Fixed;
        w.log(&mut logger, 0, &()).unwrap();
        w.log(&mut logger, 100, &()).unwrap();
        w.close::<(), _>(&logger).unwrap();
        let text = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(
            text,
            "Sample\ta\tb\n0\t1.500000\t-Inf\n100\t1.500000\t-Inf\n# done\n"
        );
    }

    #[test]
    fn row_width_checked() {
        let mut w = TraceWriter::new(Vec::new());
        assert!(w.write_row(0, &[1.0]).is_err());
        w.write_header(&["x".to_string()]).unwrap();
        assert!(w.write_row(0, &[1.0, 2.0]).is_err());
        assert!(w.write_header(&["y".to_string()]).is_err());
    }
}
