//! Systematic Reed-Solomon forward error correction.
//!
//! The code treats each byte column of a stripe independently. For a
//! `(required, total)` scheme, column values of the first `required`
//! shares are the data points of a polynomial of degree below
//! `required` over GF(256), evaluated at the share number; every other
//! share holds the evaluations at its own number. Any `required`
//! shares rebuild the stripe, and with `m` shares on hand up to
//! `(m - required) / 2` shares whose content was altered can be
//! located and repaired (Berlekamp-Welch decoding).

use serde::{Deserialize, Serialize};

use crate::error::{FecError, Result};
use crate::gf256;

/// One erasure share: a piece number and the bytes held at that
/// position of the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub number: usize,
    pub data: Vec<u8>,
}

impl Share {
    pub fn new(number: usize, data: Vec<u8>) -> Self {
        Self { number, data }
    }
}

/// Forward error corrector for a fixed `(required, total)` scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fec {
    required: usize,
    total: usize,
}

impl Fec {
    /// Create a corrector. Share numbers double as field elements, so
    /// `total` is capped at the field size.
    pub fn new(required: usize, total: usize) -> Result<Self> {
        if required == 0 || required > total || total > 256 {
            return Err(FecError::InvalidParameters { required, total });
        }
        Ok(Self { required, total })
    }

    /// Minimum number of shares needed to rebuild the stripe.
    pub fn required(&self) -> usize {
        self.required
    }

    /// Total number of shares in the scheme.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Encode a full stripe into all `total` shares.
    ///
    /// `data` must be a positive multiple of `required` bytes; chunk
    /// `i` of it becomes share `i` verbatim (systematic layout).
    pub fn encode(&self, data: &[u8]) -> Result<Vec<Share>> {
        (0..self.total)
            .map(|num| {
                Ok(Share {
                    number: num,
                    data: self.encode_single(data, num)?,
                })
            })
            .collect()
    }

    /// Encode the share at one piece number from a full stripe.
    pub fn encode_single(&self, data: &[u8], piece_num: usize) -> Result<Vec<u8>> {
        if piece_num >= self.total {
            return Err(FecError::InvalidShareNumber {
                number: piece_num,
                total: self.total,
            });
        }
        if data.is_empty() || data.len() % self.required != 0 {
            return Err(FecError::InvalidDataLength {
                len: data.len(),
                required: self.required,
            });
        }
        let share_len = data.len() / self.required;

        if piece_num < self.required {
            return Ok(data[piece_num * share_len..(piece_num + 1) * share_len].to_vec());
        }

        let xs: Vec<u8> = (0..self.required).map(|j| j as u8).collect();
        let coeffs = lagrange_coeffs(&xs, piece_num as u8);
        let mut share = vec![0u8; share_len];
        for (col, out) in share.iter_mut().enumerate() {
            let mut v = 0u8;
            for (j, &c) in coeffs.iter().enumerate() {
                v = gf256::add(v, gf256::mul(c, data[j * share_len + col]));
            }
            *out = v;
        }
        Ok(share)
    }

    /// Rebuild the stripe payload from any `required` of the given
    /// shares. The shares are assumed consistent; run [`Fec::correct`]
    /// first when they come from untrusted sources.
    pub fn rebuild(&self, shares: &[Share]) -> Result<Vec<u8>> {
        let mut sorted = self.validated_copy(shares)?;
        sorted.truncate(self.required);

        let share_len = sorted[0].data.len();
        let xs: Vec<u8> = sorted.iter().map(|s| s.number as u8).collect();
        let mut stripe = vec![0u8; self.required * share_len];

        for t in 0..self.required {
            let chunk = &mut stripe[t * share_len..(t + 1) * share_len];
            if let Some(src) = sorted.iter().find(|s| s.number == t) {
                chunk.copy_from_slice(&src.data);
                continue;
            }
            let coeffs = lagrange_coeffs(&xs, t as u8);
            for (col, out) in chunk.iter_mut().enumerate() {
                let mut v = 0u8;
                for (j, s) in sorted.iter().enumerate() {
                    v = gf256::add(v, gf256::mul(coeffs[j], s.data[col]));
                }
                *out = v;
            }
        }
        Ok(stripe)
    }

    /// Detect and repair altered shares.
    ///
    /// Returns corrected copies of the input shares, sorted by piece
    /// number. With `m` shares given, up to `(m - required) / 2`
    /// alterations per byte column are repaired; beyond that the
    /// decoder cannot converge and [`FecError::TooManyErrors`] is
    /// returned. Callers diff the result against their originals to
    /// learn which shares were tampered with.
    pub fn correct(&self, shares: &[Share]) -> Result<Vec<Share>> {
        let mut sorted = self.validated_copy(shares)?;
        let m = sorted.len();
        let e_max = (m - self.required) / 2;
        let share_len = sorted[0].data.len();
        let xs: Vec<u8> = sorted.iter().map(|s| s.number as u8).collect();

        // Interpolating from the first `required` points predicts the
        // rest; columns where the prediction holds need no decoding.
        let base = &xs[..self.required];
        let check_coeffs: Vec<Vec<u8>> = xs[self.required..]
            .iter()
            .map(|&x| lagrange_coeffs(base, x))
            .collect();

        let mut repaired_columns = 0usize;
        for col in 0..share_len {
            let ys: Vec<u8> = sorted.iter().map(|s| s.data[col]).collect();
            let consistent = check_coeffs.iter().enumerate().all(|(t, coeffs)| {
                let mut v = 0u8;
                for j in 0..self.required {
                    v = gf256::add(v, gf256::mul(coeffs[j], ys[j]));
                }
                v == ys[self.required + t]
            });
            if consistent {
                continue;
            }
            if e_max == 0 {
                return Err(FecError::TooManyErrors);
            }
            let fixed = berlekamp_welch(&xs, &ys, self.required, e_max)?;
            for (share, value) in sorted.iter_mut().zip(fixed) {
                share.data[col] = value;
            }
            repaired_columns += 1;
        }

        if repaired_columns > 0 {
            tracing::debug!(columns = repaired_columns, "repaired altered share columns");
        }
        Ok(sorted)
    }

    /// Validate a share set and return it cloned and sorted by number.
    fn validated_copy(&self, shares: &[Share]) -> Result<Vec<Share>> {
        if shares.len() < self.required {
            return Err(FecError::TooFewShares {
                got: shares.len(),
                required: self.required,
            });
        }
        let mut sorted = shares.to_vec();
        sorted.sort_by_key(|s| s.number);

        let share_len = sorted[0].data.len();
        if share_len == 0 {
            return Err(FecError::ShareSizeMismatch);
        }
        for pair in sorted.windows(2) {
            if pair[0].number == pair[1].number {
                return Err(FecError::DuplicateShare {
                    number: pair[0].number,
                });
            }
        }
        for share in &sorted {
            if share.number >= self.total {
                return Err(FecError::InvalidShareNumber {
                    number: share.number,
                    total: self.total,
                });
            }
            if share.data.len() != share_len {
                return Err(FecError::ShareSizeMismatch);
            }
        }
        Ok(sorted)
    }
}

/// Lagrange basis coefficients for interpolation points `xs`,
/// evaluated at `x`: `c[j] = prod_{l != j} (x - x_l) / (x_j - x_l)`.
fn lagrange_coeffs(xs: &[u8], x: u8) -> Vec<u8> {
    let k = xs.len();
    let mut out = vec![0u8; k];
    for j in 0..k {
        let mut num = 1u8;
        let mut den = 1u8;
        for l in 0..k {
            if l == j {
                continue;
            }
            num = gf256::mul(num, gf256::add(x, xs[l]));
            den = gf256::mul(den, gf256::add(xs[j], xs[l]));
        }
        out[j] = gf256::div(num, den);
    }
    out
}

/// Berlekamp-Welch decoding of one byte column.
///
/// Finds the unique polynomial `P` of degree below `k` that disagrees
/// with at most `e` of the points `(xs[i], ys[i])`, by solving
/// `Q(x_i) = y_i * E(x_i)` for `Q` of degree below `k + e` and a monic
/// error locator `E` of degree `e`, then dividing `P = Q / E`.
fn berlekamp_welch(xs: &[u8], ys: &[u8], k: usize, e: usize) -> Result<Vec<u8>> {
    let m = xs.len();
    let qn = k + e;
    let unknowns = qn + e;

    let mut mat = vec![vec![0u8; unknowns + 1]; m];
    for i in 0..m {
        let (x, y) = (xs[i], ys[i]);
        let mut xp = 1u8;
        for a in 0..qn {
            mat[i][a] = xp;
            xp = gf256::mul(xp, x);
        }
        let mut xp = 1u8;
        for b in 0..e {
            mat[i][qn + b] = gf256::mul(y, xp);
            xp = gf256::mul(xp, x);
        }
        // right-hand side: y * x^e
        mat[i][unknowns] = gf256::mul(y, xp);
    }

    let solution = solve(mat, unknowns).ok_or(FecError::TooManyErrors)?;
    let q = &solution[..qn];
    let mut locator = solution[qn..].to_vec();
    locator.push(1);

    let p = poly_div_exact(q, &locator).ok_or(FecError::TooManyErrors)?;

    let mut out = vec![0u8; m];
    let mut diffs = 0usize;
    for i in 0..m {
        out[i] = gf256::poly_eval(&p, xs[i]);
        if out[i] != ys[i] {
            diffs += 1;
        }
    }
    if diffs > e {
        return Err(FecError::TooManyErrors);
    }
    Ok(out)
}

/// Gauss-Jordan elimination over GF(256). Returns one solution of the
/// augmented system with free variables fixed to zero, or `None` if
/// the system is inconsistent.
fn solve(mut mat: Vec<Vec<u8>>, unknowns: usize) -> Option<Vec<u8>> {
    let rows = mat.len();
    let mut pivot_row = vec![usize::MAX; unknowns];
    let mut rank = 0usize;

    for col in 0..unknowns {
        let Some(p) = (rank..rows).find(|&r| mat[r][col] != 0) else {
            continue;
        };
        mat.swap(rank, p);
        let inv = gf256::inv(mat[rank][col]);
        for c in col..=unknowns {
            mat[rank][c] = gf256::mul(mat[rank][c], inv);
        }
        for r in 0..rows {
            if r == rank || mat[r][col] == 0 {
                continue;
            }
            let f = mat[r][col];
            for c in col..=unknowns {
                let v = gf256::mul(f, mat[rank][c]);
                mat[r][c] = gf256::add(mat[r][c], v);
            }
        }
        pivot_row[col] = rank;
        rank += 1;
        if rank == rows {
            break;
        }
    }

    for row in &mat {
        if row[..unknowns].iter().all(|&v| v == 0) && row[unknowns] != 0 {
            return None;
        }
    }

    let mut sol = vec![0u8; unknowns];
    for col in 0..unknowns {
        if pivot_row[col] != usize::MAX {
            sol[col] = mat[pivot_row[col]][unknowns];
        }
    }
    Some(sol)
}

/// Exact polynomial division by a monic divisor; `None` if the
/// remainder is nonzero.
fn poly_div_exact(num: &[u8], den: &[u8]) -> Option<Vec<u8>> {
    let mut num = num.to_vec();
    while num.last() == Some(&0) {
        num.pop();
    }
    if num.is_empty() {
        return Some(Vec::new());
    }
    let den_deg = den.len() - 1;
    if num.len() - 1 < den_deg {
        return None;
    }

    let mut quot = vec![0u8; num.len() - den_deg];
    for qi in (0..quot.len()).rev() {
        let c = num[qi + den_deg];
        quot[qi] = c;
        if c == 0 {
            continue;
        }
        for (j, &d) in den.iter().enumerate() {
            num[qi + j] = gf256::add(num[qi + j], gf256::mul(c, d));
        }
    }
    if num.iter().any(|&v| v != 0) {
        return None;
    }
    Some(quot)
}
