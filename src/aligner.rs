
/// One edit operation relating a position of sequence A to sequence B.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignOp {
    Match,
    Mismatch,
    /// Consumes one base of B only (a base absent from A).
    Insertion,
    /// Consumes one base of A only (a base absent from B).
    Deletion
}

impl AlignOp {
    pub fn symbol(&self) -> char {
        match self {
            AlignOp::Match => 'M',
            AlignOp::Mismatch => 'X',
            AlignOp::Insertion => 'I',
            AlignOp::Deletion => 'D'
        }
    }
}

/// The per-cell move recorded while filling the score matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    None,
    DiagMatch,
    DiagMismatch,
    Up,
    Left
}

/// Result of a semi-global alignment: the full edit-operation string and
/// the best score found in the matrix.
#[derive(Clone, Debug)]
pub struct Alignment {
    pub ops: Vec<AlignOp>,
    pub score: i32
}

impl Alignment {
    /// Renders the operations as an `MXID` string.
    pub fn op_string(&self) -> String {
        self.ops.iter().map(|op| op.symbol()).collect()
    }

    /// Applies the operation string to `a`, pulling substituted and
    /// inserted bases from `b`. Both sequences must be fully consumed;
    /// the result always equals `b`.
    pub fn replay(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let mut result: Vec<u8> = Vec::with_capacity(b.len());
        let mut ai = 0;
        let mut bi = 0;
        for op in self.ops.iter() {
            match op {
                AlignOp::Match => {
                    result.push(a[ai]);
                    ai += 1;
                    bi += 1;
                },
                AlignOp::Mismatch | AlignOp::Insertion => {
                    result.push(b[bi]);
                    if *op == AlignOp::Mismatch {
                        ai += 1;
                    }
                    bi += 1;
                },
                AlignOp::Deletion => {
                    ai += 1;
                }
            };
        }
        assert_eq!(ai, a.len());
        assert_eq!(bi, b.len());
        result
    }
}

/// Semi-global aligner with an any-length-one-penalty gap model: the
/// up/left DP terms use the running maximum of the column/row seen so far
/// plus a single indel penalty, so one penalty covers a gap of any length
/// without scanning all gap lengths per cell.
pub struct SswAligner {
    match_score: i32,
    mismatch_score: i32,
    indel_score: i32
}

impl Default for SswAligner {
    fn default() -> Self {
        SswAligner::new(2, -1, -1)
    }
}

impl SswAligner {
    pub fn new(match_score: i32, mismatch_score: i32, indel_score: i32) -> SswAligner {
        SswAligner {
            match_score,
            mismatch_score,
            indel_score
        }
    }

    /// Aligns `a` against `b`, producing an operation string that consumes
    /// both sequences entirely. Empty inputs short-circuit to an
    /// all-insertion or all-deletion string.
    pub fn align(&self, a: &[u8], b: &[u8]) -> Alignment {
        if a.is_empty() {
            return Alignment {
                ops: vec![AlignOp::Insertion; b.len()],
                score: 0
            };
        }
        if b.is_empty() {
            return Alignment {
                ops: vec![AlignOp::Deletion; a.len()],
                score: 0
            };
        }

        let rows = a.len() + 1;
        let cols = b.len() + 1;
        let mut scores: Vec<i32> = vec![0; rows * cols];
        let mut steps: Vec<Step> = vec![Step::None; rows * cols];
        // running maxima of each row/column filled so far
        let mut row_maxes: Vec<i32> = vec![0; rows];
        let mut col_maxes: Vec<i32> = vec![0; cols];

        let mut best_score = 0;
        let mut best_cell = (0, 0);
        for i in 1..rows {
            for j in 1..cols {
                let matched = a[i - 1] == b[j - 1];
                let diag_step = if matched { Step::DiagMatch } else { Step::DiagMismatch };
                let diag = scores[(i - 1) * cols + (j - 1)] +
                    if matched { self.match_score } else { self.mismatch_score };
                let left = row_maxes[i] + self.indel_score;
                let up = col_maxes[j] + self.indel_score;

                // tie priority: diagonal, then left, then up
                let (value, step) = if diag >= left && diag >= up {
                    (diag, diag_step)
                } else if left >= up {
                    (left, Step::Left)
                } else {
                    (up, Step::Up)
                };
                scores[i * cols + j] = value;
                steps[i * cols + j] = step;
                if value > row_maxes[i] {
                    row_maxes[i] = value;
                }
                if value > col_maxes[j] {
                    col_maxes[j] = value;
                }
                if value > best_score {
                    best_score = value;
                    best_cell = (i, j);
                }
            }
        }

        // backtrace from the best cell down to a cell with no recorded move
        let (mut i, mut j) = best_cell;
        let mut ops: Vec<AlignOp> = vec![];
        ops.extend(std::iter::repeat(AlignOp::Deletion).take(a.len() - i));
        ops.extend(std::iter::repeat(AlignOp::Insertion).take(b.len() - j));
        while i > 0 && j > 0 {
            match steps[i * cols + j] {
                Step::DiagMatch => {
                    ops.push(AlignOp::Match);
                    i -= 1;
                    j -= 1;
                },
                Step::DiagMismatch => {
                    ops.push(AlignOp::Mismatch);
                    i -= 1;
                    j -= 1;
                },
                Step::Left => {
                    ops.push(AlignOp::Insertion);
                    j -= 1;
                },
                Step::Up => {
                    ops.push(AlignOp::Deletion);
                    i -= 1;
                },
                Step::None => {
                    break;
                }
            };
        }
        // unconsumed prefix becomes leading indel runs
        ops.extend(std::iter::repeat(AlignOp::Insertion).take(j));
        ops.extend(std::iter::repeat(AlignOp::Deletion).take(i));
        ops.reverse();

        Alignment {
            ops,
            score: best_score
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_alignment() {
        let aligner = SswAligner::default();
        let alignment = aligner.align(b"ACGTACGT", b"ACGTACGT");
        assert_eq!(alignment.op_string(), "MMMMMMMM");
        assert_eq!(alignment.score, 16);
        assert_eq!(alignment.replay(b"ACGTACGT", b"ACGTACGT"), b"ACGTACGT");
    }

    #[test]
    fn test_empty_inputs() {
        let aligner = SswAligner::default();
        assert_eq!(aligner.align(b"", b"ACG").op_string(), "III");
        assert_eq!(aligner.align(b"ACG", b"").op_string(), "DDD");
        assert_eq!(aligner.align(b"", b"").op_string(), "");
    }

    #[test]
    fn test_substitution() {
        let aligner = SswAligner::default();
        let alignment = aligner.align(b"ACGT", b"AGGT");
        assert_eq!(alignment.op_string(), "MXMM");
        assert_eq!(alignment.replay(b"ACGT", b"AGGT"), b"AGGT");
    }

    #[test]
    fn test_deletion_gap() {
        let aligner = SswAligner::default();
        let alignment = aligner.align(b"AAACCTTT", b"AAATTT");
        let deletions = alignment.ops.iter().filter(|&&op| op == AlignOp::Deletion).count();
        let matches = alignment.ops.iter().filter(|&&op| op == AlignOp::Match).count();
        assert_eq!(deletions, 2);
        assert_eq!(matches, 6);
        assert_eq!(alignment.replay(b"AAACCTTT", b"AAATTT"), b"AAATTT");
    }

    #[test]
    fn test_insertion_gap() {
        let aligner = SswAligner::default();
        let alignment = aligner.align(b"AAATTT", b"AAACCTTT");
        assert_eq!(alignment.replay(b"AAATTT", b"AAACCTTT"), b"AAACCTTT");
    }

    #[test]
    fn test_replay_arbitrary_pairs() {
        let aligner = SswAligner::default();
        let pairs: Vec<(&[u8], &[u8])> = vec![
            (b"ACGT", b"TGCA"),
            (b"AAAA", b"TTTTTTTT"),
            (b"ACACACAC", b"ACAC"),
            (b"GATTACA", b"GATTACA")
        ];
        for (a, b) in pairs.into_iter() {
            let alignment = aligner.align(a, b);
            assert_eq!(alignment.replay(a, b), b, "replay failed for {:?}", alignment.op_string());
        }
    }
}
