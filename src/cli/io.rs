//! JSON-lines I/O handling for CLI
//!
//! - Input: one JSON object per line
//! - Output: one JSON object per line
//! - UTF-8 only

use std::io::{BufRead, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read JSON requests line by line. Blank lines are skipped.
pub fn read_requests<R: BufRead>(input: R) -> impl Iterator<Item = CliResult<Value>> {
    input.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(CliError::from)),
        Err(e) => Some(Err(CliError::from(e))),
    })
}

/// Write a success response
pub fn write_response<W: Write>(out: &mut W, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_line(out, &response)
}

/// Write an error response
pub fn write_error<W: Write>(out: &mut W, code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(out, &response)
}

fn write_line<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_requests_skips_blank_lines() {
        let input = Cursor::new("{\"op\":\"get_role\"}\n\n   \n{\"op\":\"set_master\"}\n");
        let requests: Vec<_> = read_requests(input).collect();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_read_requests_reports_bad_json() {
        let input = Cursor::new("not json\n");
        let requests: Vec<_> = read_requests(input).collect();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_err());
    }

    #[test]
    fn test_write_response_and_error() {
        let mut out = Vec::new();
        write_response(&mut out, serde_json::json!({"role": "MASTER"})).unwrap();
        write_error(&mut out, "X", "boom").unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let ok: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(ok["status"], "ok");
        assert_eq!(ok["data"]["role"], "MASTER");
        let err: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["code"], "X");
    }
}
