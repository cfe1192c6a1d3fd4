//! Ingestion of delimited categorical datasets.
//!
//! Records are byte-coded category values, one observation per record in
//! the row-observation layout or one variable per record in the
//! column-observation layout. Either layout can carry a variable-name
//! header and an observation-index column/row, which are consumed here so
//! the rest of the crate only ever sees an n × m variable-major block.

use crate::error::{Error, Result};
use csv_core::{ReadFieldResult, ReaderBuilder};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str;
use tracing::info;

/// The shape the caller promises the input file has.
pub struct Layout {
    /// Number of variables.
    pub n: usize,
    /// Number of observations.
    pub m: usize,
    /// Field delimiter.
    pub separator: u8,
    /// Records are variables (columns are observations) rather than the
    /// default of one observation per record.
    pub col_obs: bool,
    /// The file carries variable names: a header record in the
    /// row-observation layout, a leading field per record in the
    /// column-observation layout.
    pub var_names: bool,
    /// The file carries observation indices: a leading field per record in
    /// the row-observation layout, a header record in the
    /// column-observation layout. They are discarded.
    pub obs_indices: bool,
}

/// A parsed dataset: names and a variable-major block of category values.
pub struct TabularInput {
    /// One name per variable, synthesised as `V0`, `V1`, … when the file
    /// has none.
    pub names: Vec<String>,
    /// `n * m` values; variable `v` occupies `data[v * m .. (v + 1) * m]`.
    pub data: Vec<u8>,
}

/// Reads a dataset from any byte source.
pub fn load<R: Read>(mut input: R, layout: &Layout) -> Result<TabularInput> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    let records = split_records(&bytes, layout.separator)?;
    if layout.col_obs {
        from_variable_records(records, layout)
    } else {
        from_observation_records(records, layout)
    }
}

/// Reads a dataset from a file.
pub fn load_path(path: impl AsRef<Path>, layout: &Layout) -> Result<TabularInput> {
    let input = load(File::open(path.as_ref())?, layout)?;
    info!(
        n = layout.n,
        m = layout.m,
        path = %path.as_ref().display(),
        "dataset loaded"
    );
    Ok(input)
}

fn split_records(bytes: &[u8], separator: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new().delimiter(separator).build();
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut record = Vec::new();
    let mut records = Vec::new();
    let mut input = bytes;

    loop {
        let (result, nin, nout) = reader.read_field(input, &mut fieldbuf[fieldlen..]);
        input = &input[nin..];
        fieldlen += nout;
        match result {
            // All input consumed; the next call sees an empty slice, which
            // tells the reader to flush the final field.
            ReadFieldResult::InputEmpty => {}
            ReadFieldResult::OutputFull => {
                return Err(Error::Malformed {
                    line: reader.line(),
                    reason: "field too long".to_owned(),
                });
            }
            ReadFieldResult::Field { record_end } => {
                let text = str::from_utf8(&fieldbuf[..fieldlen]).map_err(|e| Error::Malformed {
                    line: reader.line(),
                    reason: e.to_string(),
                })?;
                fieldlen = 0;
                record.push(text.to_owned());
                if record_end {
                    records.push(std::mem::take(&mut record));
                }
            }
            ReadFieldResult::End => return Ok(records),
        }
    }
}

fn parse_value(text: &str, line: u64) -> Result<u8> {
    text.trim().parse().map_err(|_| Error::Malformed {
        line,
        reason: format!("expected a byte-coded category, got {:?}", text),
    })
}

fn synthetic_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("V{}", i)).collect()
}

/// One observation per record; variables run across the fields.
fn from_observation_records(records: Vec<Vec<String>>, layout: &Layout) -> Result<TabularInput> {
    let mut records = records.into_iter();
    let mut line = 0u64;

    let names = if layout.var_names {
        line += 1;
        let mut header = records
            .next()
            .ok_or_else(|| Error::Shape("file has no header record".to_owned()))?;
        // With an index column the header may carry a placeholder over it.
        if layout.obs_indices && header.len() == layout.n + 1 {
            header.remove(0);
        }
        if header.len() != layout.n {
            return Err(Error::Shape(format!(
                "header names {} variables, expected {}",
                header.len(),
                layout.n
            )));
        }
        header
    } else {
        synthetic_names(layout.n)
    };

    let mut data = vec![0u8; layout.n * layout.m];
    let mut rows = 0usize;
    for record in records {
        line += 1;
        if rows == layout.m {
            return Err(Error::Shape(format!(
                "more than {} observation records",
                layout.m
            )));
        }
        let fields = if layout.obs_indices {
            &record[1..]
        } else {
            &record[..]
        };
        if fields.len() != layout.n {
            return Err(Error::Shape(format!(
                "record {} has {} fields, expected {}",
                rows + 1,
                fields.len(),
                layout.n
            )));
        }
        for (v, text) in fields.iter().enumerate() {
            data[v * layout.m + rows] = parse_value(text, line)?;
        }
        rows += 1;
    }
    if rows != layout.m {
        return Err(Error::Shape(format!(
            "found {} observation records, expected {}",
            rows, layout.m
        )));
    }
    Ok(TabularInput { names, data })
}

/// One variable per record; observations run across the fields.
fn from_variable_records(records: Vec<Vec<String>>, layout: &Layout) -> Result<TabularInput> {
    let mut records = records.into_iter();
    let mut line = 0u64;

    if layout.obs_indices {
        line += 1;
        records
            .next()
            .ok_or_else(|| Error::Shape("file has no index record".to_owned()))?;
    }

    let mut names = Vec::with_capacity(layout.n);
    let mut data = vec![0u8; layout.n * layout.m];
    let mut vars = 0usize;
    for mut record in records {
        line += 1;
        if vars == layout.n {
            return Err(Error::Shape(format!(
                "more than {} variable records",
                layout.n
            )));
        }
        if layout.var_names {
            if record.is_empty() {
                return Err(Error::Shape(format!("record {} is empty", vars + 1)));
            }
            names.push(record.remove(0));
        }
        if record.len() != layout.m {
            return Err(Error::Shape(format!(
                "record {} has {} observations, expected {}",
                vars + 1,
                record.len(),
                layout.m
            )));
        }
        for (row, text) in record.iter().enumerate() {
            data[vars * layout.m + row] = parse_value(text, line)?;
        }
        vars += 1;
    }
    if vars != layout.n {
        return Err(Error::Shape(format!(
            "found {} variable records, expected {}",
            vars, layout.n
        )));
    }
    if !layout.var_names {
        names = synthetic_names(layout.n);
    }
    Ok(TabularInput { names, data })
}
