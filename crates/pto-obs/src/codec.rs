//! Newline-delimited observation streams
//!
//! One JSON array per line (see [`Observation`] for the element layout).
//! Blank lines are skipped; the first malformed line fails the stream.

use crate::model::Observation;
use pto_common::{Error, Result};
use serde_json::Value;
use std::io::{BufRead, Lines, Write};

/// Iterator over the observations in a stream
pub struct ObservationReader<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> ObservationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for ObservationReader<R> {
    type Item = Result<Observation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let line_no = self.line_no;
            let parsed = serde_json::from_str::<Value>(line)
                .map_err(Error::from)
                .and_then(|v| Observation::from_json(&v))
                .map_err(|e| Error::malformed(format!("line {line_no}: {e}")));
            return Some(parsed);
        }
    }
}

/// Decode a whole stream
pub fn read_observations(reader: impl BufRead) -> Result<Vec<Observation>> {
    ObservationReader::new(reader).collect()
}

/// Encode observations as a stream, one per line
pub fn write_observations<'a>(
    mut writer: impl Write,
    observations: impl IntoIterator<Item = &'a Observation>,
) -> Result<u64> {
    let mut written = 0;
    for obs in observations {
        serde_json::to_writer(&mut writer, obs)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}
