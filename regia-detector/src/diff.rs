use regia_core::extract_regulatory_terms;

/// Myers search is abandoned past this edit distance and the LCS fallback
/// takes over; keeps the O(d^2) trace memory bounded on pathological inputs.
const MAX_EDIT_DISTANCE: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Match,
    Delete,
    Insert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub op: EditOp,
    pub baseline_index: usize,
    pub new_index: usize,
    pub content: String,
}

/// A contiguous run of non-matching edits; the atomic unit of significance
/// scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffChunk {
    pub baseline_start: usize,
    pub baseline_end: usize,
    pub new_start: usize,
    pub new_end: usize,
    pub deleted_lines: Vec<String>,
    pub inserted_lines: Vec<String>,
    pub significance_score: f64,
}

impl DiffChunk {
    pub fn changed_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.deleted_lines.len() + self.inserted_lines.len());
        parts.extend(self.deleted_lines.iter().cloned());
        parts.extend(self.inserted_lines.iter().cloned());
        parts.join("\n")
    }

    pub fn changed_chars(&self) -> usize {
        self.deleted_lines.iter().map(String::len).sum::<usize>()
            + self.inserted_lines.iter().map(String::len).sum::<usize>()
    }

    /// Length of the longest single changed line.
    pub fn max_line_chars(&self) -> usize {
        self.deleted_lines
            .iter()
            .chain(self.inserted_lines.iter())
            .map(String::len)
            .max()
            .unwrap_or(0)
    }
}

pub fn split_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Myers O(ND) over lines with the V array sized `2*(n+m)+1`. Returns `None`
/// once the edit distance exceeds [`MAX_EDIT_DISTANCE`].
pub fn myers_diff(baseline: &[String], new: &[String]) -> Option<Vec<Edit>> {
    let n = baseline.len();
    let m = new.len();
    if n == 0 && m == 0 {
        return Some(Vec::new());
    }

    let max_d = n + m;
    let offset = max_d as i64;
    let mut v = vec![0i64; 2 * max_d + 1];
    let mut trace: Vec<Vec<i64>> = Vec::new();

    for d in 0..=max_d.min(MAX_EDIT_DISTANCE) {
        trace.push(v.clone());
        let di = d as i64;
        let mut k = -di;
        while k <= di {
            let idx = (k + offset) as usize;
            let mut x = if k == -di || (k != di && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while (x as usize) < n && (y as usize) < m && baseline[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x as usize >= n && y as usize >= m {
                return Some(backtrack_myers(baseline, new, &trace, offset));
            }
            k += 2;
        }
    }

    None
}

fn backtrack_myers(baseline: &[String], new: &[String], trace: &[Vec<i64>], offset: i64) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut x = baseline.len() as i64;
    let mut y = new.len() as i64;

    for (d, v) in trace.iter().enumerate().rev() {
        let di = d as i64;
        let k = x - y;
        let prev_k = if k == -di
            || (k != di && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit {
                op: EditOp::Match,
                baseline_index: (x - 1) as usize,
                new_index: (y - 1) as usize,
                content: baseline[(x - 1) as usize].clone(),
            });
            x -= 1;
            y -= 1;
        }

        if d > 0 {
            if x == prev_x {
                edits.push(Edit {
                    op: EditOp::Insert,
                    baseline_index: x as usize,
                    new_index: prev_y as usize,
                    content: new[prev_y as usize].clone(),
                });
            } else {
                edits.push(Edit {
                    op: EditOp::Delete,
                    baseline_index: prev_x as usize,
                    new_index: y as usize,
                    content: baseline[prev_x as usize].clone(),
                });
            }
            x = prev_x;
            y = prev_y;
        }
    }

    edits.reverse();
    edits
}

/// LCS DP fallback used when the Myers search saturates.
pub fn lcs_diff(baseline: &[String], new: &[String]) -> Vec<Edit> {
    let n = baseline.len();
    let m = new.len();
    let mut table = vec![vec![0u32; m + 1]; n + 1];

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if baseline[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut edits = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if baseline[i] == new[j] {
            edits.push(Edit {
                op: EditOp::Match,
                baseline_index: i,
                new_index: j,
                content: baseline[i].clone(),
            });
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            edits.push(Edit {
                op: EditOp::Delete,
                baseline_index: i,
                new_index: j,
                content: baseline[i].clone(),
            });
            i += 1;
        } else {
            edits.push(Edit {
                op: EditOp::Insert,
                baseline_index: i,
                new_index: j,
                content: new[j].clone(),
            });
            j += 1;
        }
    }
    while i < n {
        edits.push(Edit {
            op: EditOp::Delete,
            baseline_index: i,
            new_index: j,
            content: baseline[i].clone(),
        });
        i += 1;
    }
    while j < m {
        edits.push(Edit {
            op: EditOp::Insert,
            baseline_index: i,
            new_index: j,
            content: new[j].clone(),
        });
        j += 1;
    }

    edits
}

pub fn compute_diff(baseline: &[String], new: &[String]) -> Vec<Edit> {
    match myers_diff(baseline, new) {
        Some(edits) => edits,
        None => lcs_diff(baseline, new),
    }
}

/// Groups contiguous non-MATCH runs of the edit script into chunks and scores
/// each one.
pub fn group_chunks(edits: &[Edit]) -> Vec<DiffChunk> {
    let mut chunks = Vec::new();
    let mut current: Option<DiffChunk> = None;

    for edit in edits {
        match edit.op {
            EditOp::Match => {
                if let Some(mut chunk) = current.take() {
                    chunk.significance_score = chunk_significance(&chunk);
                    chunks.push(chunk);
                }
            }
            EditOp::Delete | EditOp::Insert => {
                let chunk = current.get_or_insert_with(|| DiffChunk {
                    baseline_start: edit.baseline_index,
                    baseline_end: edit.baseline_index,
                    new_start: edit.new_index,
                    new_end: edit.new_index,
                    ..DiffChunk::default()
                });
                match edit.op {
                    EditOp::Delete => {
                        chunk.deleted_lines.push(edit.content.clone());
                        chunk.baseline_end = edit.baseline_index + 1;
                    }
                    EditOp::Insert => {
                        chunk.inserted_lines.push(edit.content.clone());
                        chunk.new_end = edit.new_index + 1;
                    }
                    EditOp::Match => unreachable!(),
                }
            }
        }
    }

    if let Some(mut chunk) = current.take() {
        chunk.significance_score = chunk_significance(&chunk);
        chunks.push(chunk);
    }

    chunks
}

/// `0.4 * volume + 0.4 * keyword_density + 0.2 * change_type`, all clamped to
/// [0, 1].
pub fn chunk_significance(chunk: &DiffChunk) -> f64 {
    let line_count = chunk.deleted_lines.len() + chunk.inserted_lines.len();
    let volume = (line_count as f64 / 10.0).min(1.0);

    let keywords = extract_regulatory_terms(&chunk.changed_text());
    let keyword_density = (keywords.len() as f64 / 5.0).min(1.0);

    let change_type = if !chunk.deleted_lines.is_empty() && !chunk.inserted_lines.is_empty() {
        0.8
    } else {
        0.5
    };

    (0.4 * volume + 0.4 * keyword_density + 0.2 * change_type).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    fn apply_edits(edits: &[Edit]) -> (Vec<String>, Vec<String>) {
        let mut baseline = Vec::new();
        let mut new = Vec::new();
        for edit in edits {
            match edit.op {
                EditOp::Match => {
                    baseline.push(edit.content.clone());
                    new.push(edit.content.clone());
                }
                EditOp::Delete => baseline.push(edit.content.clone()),
                EditOp::Insert => new.push(edit.content.clone()),
            }
        }
        (baseline, new)
    }

    #[test]
    fn test_split_lines_trims_and_drops_empty() {
        assert_eq!(
            split_lines("  a  \n\n b\nc \n"),
            lines(&["a", "b", "c"])
        );
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_myers_identical_inputs() {
        let a = lines(&["one", "two", "three"]);
        let edits = myers_diff(&a, &a).unwrap();
        assert_eq!(edits.len(), 3);
        assert!(edits.iter().all(|e| e.op == EditOp::Match));
    }

    #[test]
    fn test_myers_insert_only() {
        let a = lines(&["one", "three"]);
        let b = lines(&["one", "two", "three"]);
        let edits = myers_diff(&a, &b).unwrap();
        let inserts: Vec<_> = edits.iter().filter(|e| e.op == EditOp::Insert).collect();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].content, "two");
        let (ra, rb) = apply_edits(&edits);
        assert_eq!(ra, a);
        assert_eq!(rb, b);
    }

    #[test]
    fn test_myers_delete_only() {
        let a = lines(&["one", "two", "three"]);
        let b = lines(&["one", "three"]);
        let edits = myers_diff(&a, &b).unwrap();
        let deletes: Vec<_> = edits.iter().filter(|e| e.op == EditOp::Delete).collect();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].content, "two");
        let (ra, rb) = apply_edits(&edits);
        assert_eq!(ra, a);
        assert_eq!(rb, b);
    }

    #[test]
    fn test_myers_replace() {
        let a = lines(&["capital ratio 8%"]);
        let b = lines(&["capital ratio 10%", "banks report quarterly"]);
        let edits = myers_diff(&a, &b).unwrap();
        let (ra, rb) = apply_edits(&edits);
        assert_eq!(ra, a);
        assert_eq!(rb, b);
        assert!(edits.iter().any(|e| e.op == EditOp::Delete));
        assert!(edits.iter().filter(|e| e.op == EditOp::Insert).count() == 2);
    }

    #[test]
    fn test_myers_empty_sides() {
        let empty: Vec<String> = Vec::new();
        let b = lines(&["a", "b"]);
        let edits = myers_diff(&empty, &b).unwrap();
        assert!(edits.iter().all(|e| e.op == EditOp::Insert));
        let edits = myers_diff(&b, &empty).unwrap();
        assert!(edits.iter().all(|e| e.op == EditOp::Delete));
        assert!(myers_diff(&empty, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_lcs_matches_myers_reconstruction() {
        let a = lines(&["one", "two", "three", "four"]);
        let b = lines(&["one", "2", "three", "five", "six"]);
        let edits = lcs_diff(&a, &b);
        let (ra, rb) = apply_edits(&edits);
        assert_eq!(ra, a);
        assert_eq!(rb, b);
    }

    #[test]
    fn test_group_chunks_contiguous_runs() {
        let a = lines(&["keep", "old line", "keep2", "tail"]);
        let b = lines(&["keep", "new line", "keep2", "tail", "extra"]);
        let edits = compute_diff(&a, &b);
        let chunks = group_chunks(&edits);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].deleted_lines, vec!["old line".to_string()]);
        assert_eq!(chunks[0].inserted_lines, vec!["new line".to_string()]);
        assert_eq!(chunks[1].deleted_lines.len(), 0);
        assert_eq!(chunks[1].inserted_lines, vec!["extra".to_string()]);
    }

    #[test]
    fn test_chunk_significance_bounds() {
        let chunk = DiffChunk {
            deleted_lines: vec!["capital liquidity risk reporting compliance".to_string()],
            inserted_lines: vec!["capital buffer ratio disclosure audit".to_string()],
            ..DiffChunk::default()
        };
        let score = chunk_significance(&chunk);
        assert!(score > 0.0 && score <= 1.0);

        let trivial = DiffChunk {
            inserted_lines: vec!["hello".to_string()],
            ..DiffChunk::default()
        };
        let trivial_score = chunk_significance(&trivial);
        assert!(trivial_score <= score);
        assert!((0.0..=1.0).contains(&trivial_score));
    }

    #[test]
    fn test_change_type_weight() {
        let both_sides = DiffChunk {
            deleted_lines: vec!["x".to_string()],
            inserted_lines: vec!["y".to_string()],
            ..DiffChunk::default()
        };
        let one_side = DiffChunk {
            inserted_lines: vec!["x".to_string(), "y".to_string()],
            ..DiffChunk::default()
        };
        // Same volume and no keywords; replacement outranks pure insertion.
        assert!(chunk_significance(&both_sides) > chunk_significance(&one_side));
    }
}
