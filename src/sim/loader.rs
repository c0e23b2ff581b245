//! Access Trace Loader.
//!
//! Reads the workload driven by the requester. A trace is a text file with
//! one access per line:
//!
//! ```text
//! # port  op  address     size  [data]
//! 0       R   0x1000      8
//! 1       W   0x2040      4     0xdeadbeef
//! ```
//!
//! `op` is `R` or `W`; numbers are decimal or `0x`-prefixed hexadecimal.
//! Write data is a little-endian integer of at most eight bytes and defaults
//! to zero; it must fit in the access size. Sizes above `MAX_ACCESS_SIZE`
//! are rejected. Blank lines and `#` comments are ignored.

use crate::common::SimError;
use crate::core::cpu::Access;
use std::fs;

/// Largest access a trace line may request, in bytes.
pub const MAX_ACCESS_SIZE: u64 = 4096;

/// Reads and parses a trace file for a requester with `ports` ports.
///
/// # Returns
///
/// One access script per port, in file order.
pub fn load_trace(path: &str, ports: usize) -> Result<Vec<Vec<Access>>, SimError> {
    let text = fs::read_to_string(path).map_err(|e| SimError::Trace {
        line: 0,
        message: format!("could not read '{}': {}", path, e),
    })?;
    parse_trace(&text, ports)
}

/// Parses trace text into per-port access scripts.
pub fn parse_trace(text: &str, ports: usize) -> Result<Vec<Vec<Access>>, SimError> {
    let mut scripts = vec![Vec::new(); ports];

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let err = |message: String| SimError::Trace { line, message };
        let fields: Vec<&str> = content.split_whitespace().collect();
        if fields.len() < 4 || fields.len() > 5 {
            return Err(err(format!(
                "expected '<port> <R|W> <addr> <size> [data]', found '{}'",
                content
            )));
        }

        let port = parse_number(fields[0]).map_err(&err)? as usize;
        if port >= ports {
            return Err(err(format!(
                "port {} out of range (requester has {})",
                port, ports
            )));
        }

        let addr = parse_number(fields[2]).map_err(&err)?;
        let size = parse_number(fields[3]).map_err(&err)?;
        if size == 0 || size > MAX_ACCESS_SIZE {
            return Err(err(format!(
                "access size {} outside 1..={}",
                size, MAX_ACCESS_SIZE
            )));
        }
        let size = size as usize;

        let access = match fields[1] {
            "R" | "r" => {
                if fields.len() == 5 {
                    return Err(err("read accesses carry no data".to_string()));
                }
                Access::read(addr, size)
            }
            "W" | "w" => {
                let value = match fields.get(4) {
                    Some(text) => parse_number(text).map_err(&err)?,
                    None => 0,
                };
                Access::write(addr, encode_value(value, size).map_err(&err)?)
            }
            other => return Err(err(format!("unknown operation '{}'", other))),
        };

        scripts[port].push(access);
    }

    Ok(scripts)
}

fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("invalid number '{}'", text))
}

/// Little-endian bytes of `value`, zero-extended to `size`.
fn encode_value(value: u64, size: usize) -> Result<Vec<u8>, String> {
    if size < 8 && value >> (8 * size) != 0 {
        return Err(format!("value {:#x} does not fit in {} bytes", value, size));
    }
    let mut bytes = value.to_le_bytes().to_vec();
    bytes.resize(size, 0);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_accesses_by_port() {
        let trace = "\
            # warm up\n\
            0 R 0x1000 8\n\
            \n\
            1 W 0x2000 4 0xdeadbeef  # store\n\
            0 R 64 1\n";
        let scripts = parse_trace(trace, 2).unwrap();
        assert_eq!(scripts[0], vec![Access::read(0x1000, 8), Access::read(64, 1)]);
        assert_eq!(
            scripts[1],
            vec![Access::write(0x2000, vec![0xef, 0xbe, 0xad, 0xde])]
        );
    }

    #[test]
    fn reports_the_offending_line() {
        let trace = "0 R 0x0 8\n0 X 0x40 8\n";
        match parse_trace(trace, 1) {
            Err(SimError::Trace { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected trace error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_ports() {
        assert!(parse_trace("3 R 0x0 8\n", 2).is_err());
    }

    #[test]
    fn rejects_oversized_accesses() {
        for trace in [
            "0 W 0x0 0xffffffffffffffff 1\n",
            "0 W 0x0 0x10000000000\n",
            "0 R 0x0 4097\n",
            "0 R 0x0 0\n",
        ] {
            assert!(
                matches!(parse_trace(trace, 1), Err(SimError::Trace { line: 1, .. })),
                "accepted {:?}",
                trace
            );
        }
        assert!(parse_trace("0 R 0x0 4096\n", 1).is_ok());
    }

    #[test]
    fn write_value_must_fit_its_size() {
        assert!(matches!(
            parse_trace("0 W 0x0 1 0x1ff\n", 1),
            Err(SimError::Trace { line: 1, .. })
        ));
        let scripts = parse_trace("0 W 0x0 2 0x1ff\n0 W 0x8 16 0xff\n", 1).unwrap();
        assert_eq!(scripts[0][0].data, vec![0xff, 0x01]);
        assert_eq!(scripts[0][1].data.len(), 16);
        assert_eq!(scripts[0][1].data[0], 0xff);
    }
}
