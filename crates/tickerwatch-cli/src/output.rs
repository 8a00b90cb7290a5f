use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

pub fn render(data: &Value, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, data, pretty)?;
    handle.flush()?;
    Ok(())
}

fn write_json<W: Write>(writer: &mut W, data: &Value, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, data)?;
    } else {
        serde_json::to_writer(&mut *writer, data)?;
    }
    writeln!(writer)?;
    Ok(())
}

/// Writes one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), CliError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize, CliError> {
        self.writer.flush()?;
        Ok(self.lines)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ndjson_writes_one_object_per_line() {
        let mut buffer = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buffer);
        writer.write(&json!({"ticker": "TSLA"})).expect("write");
        writer.write(&json!({"ticker": "GME"})).expect("write");
        assert_eq!(writer.finish().expect("finish"), 2);

        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text, "{\"ticker\":\"TSLA\"}\n{\"ticker\":\"GME\"}\n");
    }

    #[test]
    fn compact_and_pretty_json_end_with_newline() {
        let value = json!({"status": "completed"});
        let mut compact = Vec::new();
        write_json(&mut compact, &value, false).expect("compact");
        assert_eq!(compact, b"{\"status\":\"completed\"}\n");

        let mut pretty = Vec::new();
        write_json(&mut pretty, &value, true).expect("pretty");
        assert!(String::from_utf8(pretty).expect("utf8").contains("\n  \"status\""));
    }
}
