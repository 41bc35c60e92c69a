//! # 2-Bit Matrix Transpose
//!
//! Turns variant-major PLINK1 rows (4 samples per byte) into sample-major
//! rows (4 variants per byte), one 4x4 block of 2-bit cells at a time.

/// Transpose `n_variants` variant-major rows into a sample-major tile.
///
/// * `input` holds `n_variants` rows of `row_bytes_in` bytes each.
/// * Row `r` lands in column `lead + r` of the tile, so a tile whose first
///   variant is not byte-aligned in the final output can be OR-ed into place.
/// * `out` is resized to `sample_ct` rows of `(lead + n_variants).div_ceil(4)`
///   bytes; cells outside the transposed rows are zero.
///
/// Returns the tile row width in bytes.
pub fn transpose_tile(
    input: &[u8],
    row_bytes_in: usize,
    sample_ct: usize,
    n_variants: usize,
    lead: usize,
    out: &mut Vec<u8>,
) -> usize {
    debug_assert!(lead < 4);
    debug_assert!(input.len() >= n_variants * row_bytes_in);
    let out_row_bytes = (lead + n_variants).div_ceil(4);
    out.clear();
    out.resize(sample_ct * out_row_bytes, 0);
    if sample_ct == 0 || n_variants == 0 {
        return out_row_bytes;
    }

    let row = |col: usize| -> Option<&[u8]> {
        if col < lead || col - lead >= n_variants {
            return None;
        }
        let r = col - lead;
        Some(&input[r * row_bytes_in..(r + 1) * row_bytes_in])
    };

    for q in 0..out_row_bytes {
        let rows = [row(4 * q), row(4 * q + 1), row(4 * q + 2), row(4 * q + 3)];
        for j in 0..row_bytes_in {
            let block = [
                rows[0].map_or(0, |r| r[j]),
                rows[1].map_or(0, |r| r[j]),
                rows[2].map_or(0, |r| r[j]),
                rows[3].map_or(0, |r| r[j]),
            ];
            if block == [0; 4] {
                continue;
            }
            for k in 0..4 {
                let sample = 4 * j + k;
                if sample >= sample_ct {
                    break;
                }
                out[sample * out_row_bytes + q] = transpose_cell(block, k);
            }
        }
    }
    out_row_bytes
}

/// Gather cell `k` of each of four bytes into one byte
#[inline]
fn transpose_cell(block: [u8; 4], k: usize) -> u8 {
    let shift = 2 * k;
    ((block[0] >> shift) & 3)
        | (((block[1] >> shift) & 3) << 2)
        | (((block[2] >> shift) & 3) << 4)
        | (((block[3] >> shift) & 3) << 6)
}
