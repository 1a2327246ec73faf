//! Throughput unit normalization.
//!
//! Measurement backends report throughput without a unit tag: some in Gbps,
//! some in Mbps, Kbps or plain bits per second. [`normalize_speed`] guesses
//! the unit from the magnitude alone and converts to bytes per second. This is
//! a best-effort heuristic, not a protocol: a 10 Mbps link reported in Mbps is
//! indistinguishable from a 10 Gbps link reported in Gbps, and a value of
//! exactly 20,000,000 may be bits/s or a malformed Kbps reading. The bands are
//! kept as they are rather than guessing harder.

const GBPS_UPPER: f64 = 20.0;
const MBPS_UPPER: f64 = 20_000.0;
const KBPS_UPPER: f64 = 20_000_000.0;

const BYTES_PER_GBIT: f64 = 125_000_000.0;
const BYTES_PER_MBIT: f64 = 125_000.0;
const BYTES_PER_KBIT: f64 = 125.0;
const BITS_PER_BYTE: f64 = 8.0;

/// Convert a raw throughput reading to bytes per second.
///
/// | raw                      | assumed unit |
/// |--------------------------|--------------|
/// | (0, 20)                  | Gbps         |
/// | [20, 20 000)             | Mbps         |
/// | [20 000, 20 000 000)     | Kbps         |
/// | [20 000 000, inf)        | bits/s       |
/// | zero, negative, NaN      | bits/s       |
pub fn normalize_speed(raw: f64) -> f64 {
    if raw > 0.0 && raw < GBPS_UPPER {
        raw * BYTES_PER_GBIT
    } else if (GBPS_UPPER..MBPS_UPPER).contains(&raw) {
        raw * BYTES_PER_MBIT
    } else if (MBPS_UPPER..KBPS_UPPER).contains(&raw) {
        raw * BYTES_PER_KBIT
    } else {
        raw / BITS_PER_BYTE
    }
}
