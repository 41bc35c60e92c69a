//! # Fixed-Point Decimal Printing
//!
//! Prints `n / D` as the shortest decimal string that parses back to `n`,
//! instead of a constant five digits: `3277 / 16384` prints as `0.2`, not
//! `0.20001`, because `0.2` still lies in `(3276.5 / 16384, 3277.5 / 16384)`.
//!
//! Both supported denominators are powers of two between 10^4 and 10^5, so
//! the round-trip interval (width `1 / D`) holds at most one 4-digit decimal
//! and always holds a 5-digit one. The algorithm is therefore: integer part,
//! then the nearest 4-digit candidate if it lands inside the interval,
//! otherwise the nearest 5-digit candidate. Trailing zeros are dropped.
//!
//! All arithmetic is on integers; no float is ever formatted.

/// Dosage denominator (one allele copy)
pub const DOSAGE_DENOM: u32 = 16384;
/// Haploid / per-haplotype denominator
pub const HAPLOID_DENOM: u32 = 32768;
/// Longest string produced for values below 10
pub const MAX_WIDTH: usize = 7;

/// Append `n / denom` to `out`.
///
/// `denom` must be a power of two in `(10^4, 10^5)`.
pub fn write_fixed(n: u32, denom: u32, out: &mut Vec<u8>) {
    debug_assert!(denom.is_power_of_two() && denom > 10_000 && denom < 100_000);
    push_uint(n / denom, out);
    let r = (n % denom) as u64;
    if r == 0 {
        return;
    }
    out.push(b'.');
    let d = denom as u64;

    let c4 = (r * 10_000 + d / 2) / d;
    if (c4 * d).abs_diff(r * 10_000) < 5_000 {
        push_fraction(c4 as u32, 4, out);
        return;
    }

    // r / d * 10^5 == r * 3125 / (d / 32); ties go to the even neighbour
    let m = d / 32;
    let num = r * 3125;
    let mut c5 = num / m;
    let rem = num % m;
    if rem > m / 2 || (rem == m / 2 && c5 % 2 == 1) {
        c5 += 1;
    }
    push_fraction(c5 as u32, 5, out);
}

/// Append `n / 16384` for a value that came through BGEN-1.1 style
/// requantization.
///
/// Such values are recovered as `v = round(x * 32768)`, `n = (v + 1) / 2`, so
/// the set of strings mapping back to `n` is `((n - 0.75) / 16384,
/// (n + 0.25) / 16384)` rather than the symmetric interval used by
/// [`write_fixed`].
pub fn write_requantized_16384(n: u32, out: &mut Vec<u8>) {
    let d = DOSAGE_DENOM as u64;
    push_uint(n / DOSAGE_DENOM, out);
    let r = (n % DOSAGE_DENOM) as u64;
    if r == 0 {
        return;
    }
    out.push(b'.');

    let lo = r * 10_000 / d;
    for c4 in [lo, lo + 1] {
        let diff = (c4 * d) as i64 - (r * 10_000) as i64;
        if diff > -7_500 && diff < 2_500 {
            push_fraction(c4 as u32, 4, out);
            return;
        }
    }

    // nearest 5-digit value to the interval centre (r - 0.25) / d
    let m = d / 8;
    let num = (4 * r - 1) * 3125;
    let mut c5 = num / m;
    let rem = num % m;
    if rem > m / 2 || (rem == m / 2 && c5 % 2 == 1) {
        c5 += 1;
    }
    push_fraction(c5 as u32, 5, out);
}

/// Convenience wrapper returning a `String`
pub fn format_fixed(n: u32, denom: u32) -> String {
    let mut buf = Vec::with_capacity(MAX_WIDTH);
    write_fixed(n, denom, &mut buf);
    String::from_utf8(buf).unwrap_or_default()
}

/// Parse a decimal string back to the nearest multiple of `1 / denom`
pub fn parse_fixed(s: &str, denom: u32) -> Option<u32> {
    let (int_part, frac, scale) = split_decimal(s)?;
    let d = denom as u64;
    let frac_units = (frac * d * 2 + scale) / (scale * 2);
    u32::try_from(int_part * d + frac_units).ok()
}

/// Parse the way a BGEN-1.1 importer would: round to 1/32768, then halve
/// rounding up
pub fn parse_requantized_16384(s: &str) -> Option<u32> {
    let (int_part, frac, scale) = split_decimal(s)?;
    let v = int_part * 32_768 + (frac * 32_768 * 2 + scale) / (scale * 2);
    u32::try_from(v.div_ceil(2)).ok()
}

fn split_decimal(s: &str) -> Option<(u64, u64, u64)> {
    let (int_str, frac_str) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_str.is_empty() || frac_str.len() > 9 {
        return None;
    }
    if !int_str.bytes().chain(frac_str.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let int_part: u64 = int_str.parse().ok()?;
    let frac: u64 = if frac_str.is_empty() {
        0
    } else {
        frac_str.parse().ok()?
    };
    Some((int_part, frac, 10u64.pow(frac_str.len() as u32)))
}

#[inline]
fn push_uint(v: u32, out: &mut Vec<u8>) {
    if v < 10 {
        out.push(b'0' + v as u8);
    } else {
        out.extend_from_slice(v.to_string().as_bytes());
    }
}

/// Push `value` as exactly `digits` zero-padded digits, minus trailing zeros
#[inline]
fn push_fraction(mut value: u32, digits: usize, out: &mut Vec<u8>) {
    let mut buf = [b'0'; 5];
    for slot in buf[..digits].iter_mut().rev() {
        *slot = b'0' + (value % 10) as u8;
        value /= 10;
    }
    let mut end = digits;
    while end > 1 && buf[end - 1] == b'0' {
        end -= 1;
    }
    out.extend_from_slice(&buf[..end]);
}
