// ABOUTME: Human-unit resource quantities ("500m" CPU, "512Mi" memory).
// ABOUTME: Converts them to engine units: CPU shares, nano-CPUs and bytes.

use thiserror::Error;

/// CPU shares granted to one full core by the container engine.
pub const SHARES_PER_CPU: u64 = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity cannot be empty")]
    Empty,

    #[error("invalid CPU quantity: {0}")]
    InvalidCpu(String),

    #[error("invalid memory quantity: {0}")]
    InvalidMemory(String),
}

/// Parse a CPU quantity into cores: `"500m"` is half a core, `"2"` two cores.
pub fn parse_cpu(spec: &str) -> Result<f64, QuantityError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(QuantityError::Empty);
    }

    let cores = match spec.strip_suffix('m') {
        Some(millis) => millis
            .parse::<u64>()
            .map(|m| m as f64 / 1000.0)
            .map_err(|_| QuantityError::InvalidCpu(spec.to_string()))?,
        None => spec
            .parse::<f64>()
            .map_err(|_| QuantityError::InvalidCpu(spec.to_string()))?,
    };

    if !cores.is_finite() || cores < 0.0 {
        return Err(QuantityError::InvalidCpu(spec.to_string()));
    }

    Ok(cores)
}

/// CPU shares for a CPU quantity (`"500m"` -> 512).
pub fn cpu_shares(spec: &str) -> Result<u64, QuantityError> {
    parse_cpu(spec).map(|cores| (cores * SHARES_PER_CPU as f64).round() as u64)
}

/// Nano-CPUs for a CPU quantity (`"500m"` -> 500_000_000).
pub fn nano_cpus(spec: &str) -> Result<u64, QuantityError> {
    parse_cpu(spec).map(|cores| (cores * 1_000_000_000.0).round() as u64)
}

/// Parse a memory quantity into bytes.
///
/// Accepts binary suffixes `Ki`, `Mi`, `Gi`, `Ti`, `Pi` and the single-letter
/// engine forms `k`, `m`, `g`, `t` (any case), all as powers of 1024. A bare
/// number is bytes.
pub fn parse_memory(spec: &str) -> Result<u64, QuantityError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(QuantityError::Empty);
    }

    let invalid = || QuantityError::InvalidMemory(spec.to_string());

    let split = spec
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(spec.len());
    let (number, suffix) = spec.split_at(split);

    let power = match suffix.to_ascii_lowercase().as_str() {
        "" => 0,
        "k" | "ki" => 1,
        "m" | "mi" => 2,
        "g" | "gi" => 3,
        "t" | "ti" => 4,
        "pi" => 5,
        _ => return Err(invalid()),
    };
    let multiplier = 1024u64.pow(power);

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier).ok_or_else(invalid);
    }

    let fractional = number.parse::<f64>().map_err(|_| invalid())?;
    let bytes = fractional * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes.round() as u64)
}
