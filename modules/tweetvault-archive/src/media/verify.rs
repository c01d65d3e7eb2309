// Acceptance rule for a downloaded candidate.
//
// Pixel area outranks byte size. Equal area falls back to a byte-size
// increase. With no dimensions on either side any byte difference counts as
// an upgrade. Dimensions on one side only mean a damaged transfer.

use std::cmp::Ordering;

use super::artifact::Measure;

/// What the decision was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    PixelArea,
    ByteSize,
    /// No local file to compare against.
    NoLocalFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept(Basis),
    Reject(Basis),
    Inconclusive,
}

pub fn judge(local: Option<&Measure>, candidate: &Measure) -> Verdict {
    let Some(local) = local else {
        return Verdict::Accept(Basis::NoLocalFile);
    };

    match (local.dimensions, candidate.dimensions) {
        (Some(before), Some(after)) => match after.area().cmp(&before.area()) {
            Ordering::Greater => Verdict::Accept(Basis::PixelArea),
            Ordering::Less => Verdict::Reject(Basis::PixelArea),
            Ordering::Equal if candidate.bytes > local.bytes => Verdict::Accept(Basis::ByteSize),
            Ordering::Equal => Verdict::Reject(Basis::ByteSize),
        },
        (None, None) if candidate.bytes != local.bytes => Verdict::Accept(Basis::ByteSize),
        (None, None) => Verdict::Reject(Basis::ByteSize),
        _ => Verdict::Inconclusive,
    }
}

/// Signed change from `before` to `after` in percent; `None` when `before`
/// is zero.
pub fn percent_change(before: u64, after: u64) -> Option<f64> {
    if before == 0 {
        return None;
    }
    Some((after as f64 - before as f64) * 100.0 / before as f64)
}
