//! Kubernetes resource quantity parsing
//!
//! Normalizes the quantity strings found on container requests/limits:
//! CPU to fractional cores, memory to bytes. Only the suffixes that
//! actually appear on pod specs are handled; anything else is an error.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("invalid CPU quantity {0:?}")]
    InvalidCpu(String),
    #[error("invalid memory quantity {0:?}")]
    InvalidMemory(String),
}

/// Parse a CPU quantity string to fractional cores.
///
/// `"500m"` -> 0.5, `"250u"` -> 0.00025, `"2"` -> 2.0. An empty string
/// parses as zero, matching how the API server reports it.
pub fn parse_cpu(cpu: &str) -> Result<f64, QuantityError> {
    let cpu = cpu.trim();
    if cpu.is_empty() || cpu == "0" {
        return Ok(0.0);
    }

    let (number, divisor) = if let Some(stripped) = cpu.strip_suffix('m') {
        (stripped, 1_000.0)
    } else if let Some(stripped) = cpu.strip_suffix('u') {
        (stripped, 1_000_000.0)
    } else {
        (cpu, 1.0)
    };

    let value: f64 = number
        .parse()
        .map_err(|_| QuantityError::InvalidCpu(cpu.to_string()))?;
    if value < 0.0 {
        return Err(QuantityError::InvalidCpu(cpu.to_string()));
    }
    Ok(value / divisor)
}

/// Binary suffixes are powers of 1024, decimal suffixes powers of 1000.
/// Two-character suffixes must be checked first so "Ki" is not read as "K".
const MEMORY_SUFFIXES: &[(&str, u64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("K", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
];

/// Parse a memory quantity string to bytes.
///
/// `"512Mi"` -> 536870912, `"1G"` -> 1000000000, `"128974848"` -> as given.
pub fn parse_memory(memory: &str) -> Result<u64, QuantityError> {
    let memory = memory.trim();
    if memory.is_empty() || memory == "0" {
        return Ok(0);
    }

    for (suffix, multiplier) in MEMORY_SUFFIXES {
        if let Some(number) = memory.strip_suffix(suffix) {
            let value: f64 = number
                .parse()
                .map_err(|_| QuantityError::InvalidMemory(memory.to_string()))?;
            if value < 0.0 {
                return Err(QuantityError::InvalidMemory(memory.to_string()));
            }
            return Ok((value * *multiplier as f64) as u64);
        }
    }

    memory
        .parse::<f64>()
        .map_err(|_| QuantityError::InvalidMemory(memory.to_string()))
        .and_then(|v| {
            if v < 0.0 {
                Err(QuantityError::InvalidMemory(memory.to_string()))
            } else {
                Ok(v as u64)
            }
        })
}
