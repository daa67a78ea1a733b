//! Git-style unified diff rendering for run results.
//!
//! Line-based longest-common-subsequence diff with three lines of context
//! per hunk, rendered in `git diff` format including file mode lines for
//! additions, deletions, and permission flips.

use std::fmt::Write as _;

/// One side of a file comparison.
pub(crate) struct DiffSide<'a> {
    pub path: String,
    pub text: &'a str,
    pub mode: &'static str,
}

const CONTEXT: usize = 3;

/// Render a git-format diff. `None` on a side means the file does not
/// exist there (addition or deletion).
pub(crate) fn git_diff(before: Option<DiffSide<'_>>, after: Option<DiffSide<'_>>) -> String {
    let mut out = String::new();
    match (&before, &after) {
        (Some(b), Some(a)) => {
            let _ = writeln!(out, "diff --git a/{} b/{}", b.path, a.path);
            if b.mode != a.mode {
                let _ = writeln!(out, "old mode {}", b.mode);
                let _ = writeln!(out, "new mode {}", a.mode);
            }
            let _ = writeln!(out, "--- a/{}", b.path);
            let _ = writeln!(out, "+++ b/{}", a.path);
        }
        (None, Some(a)) => {
            let _ = writeln!(out, "diff --git a/{} b/{}", a.path, a.path);
            let _ = writeln!(out, "new file mode {}", a.mode);
            let _ = writeln!(out, "--- /dev/null");
            let _ = writeln!(out, "+++ b/{}", a.path);
        }
        (Some(b), None) => {
            let _ = writeln!(out, "diff --git a/{} b/{}", b.path, b.path);
            let _ = writeln!(out, "deleted file mode {}", b.mode);
            let _ = writeln!(out, "--- a/{}", b.path);
            let _ = writeln!(out, "+++ /dev/null");
        }
        (None, None) => return out,
    }

    let old_lines: Vec<&str> = before.as_ref().map_or_else(Vec::new, |s| s.text.lines().collect());
    let new_lines: Vec<&str> = after.as_ref().map_or_else(Vec::new, |s| s.text.lines().collect());
    let opcodes = opcodes(&old_lines, &new_lines);

    for group in grouped(&opcodes, CONTEXT) {
        let first = group.first().expect("groups are never empty");
        let last = group.last().expect("groups are never empty");
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            range(first.i1, last.i2),
            range(first.j1, last.j2)
        );
        for code in &group {
            match code.tag {
                Tag::Equal => {
                    for line in &old_lines[code.i1..code.i2] {
                        let _ = writeln!(out, " {line}");
                    }
                }
                Tag::Delete | Tag::Replace => {
                    for line in &old_lines[code.i1..code.i2] {
                        let _ = writeln!(out, "-{line}");
                    }
                    for line in &new_lines[code.j1..code.j2] {
                        let _ = writeln!(out, "+{line}");
                    }
                }
                Tag::Insert => {
                    for line in &new_lines[code.j1..code.j2] {
                        let _ = writeln!(out, "+{line}");
                    }
                }
            }
        }
    }

    out
}

fn range(start: usize, end: usize) -> String {
    let len = end - start;
    // Git numbers lines from 1, except an empty range keeps the 0-based
    // insertion point.
    let shown = if len == 0 { start } else { start + 1 };
    if len == 1 {
        shown.to_string()
    } else {
        format!("{shown},{len}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Clone, Copy, Debug)]
struct OpCode {
    tag: Tag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

/// Maximal runs of matching lines, ending with a zero-length sentinel.
fn matching_blocks(a: &[&str], b: &[&str]) -> Vec<(usize, usize, usize)> {
    let n = a.len();
    let m = b.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut blocks = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            let (si, sj) = (i, j);
            while i < n && j < m && a[i] == b[j] {
                i += 1;
                j += 1;
            }
            blocks.push((si, sj, i - si));
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    blocks.push((n, m, 0));
    blocks
}

fn opcodes(a: &[&str], b: &[&str]) -> Vec<OpCode> {
    let mut codes = Vec::new();
    let (mut i, mut j) = (0, 0);
    for (bi, bj, size) in matching_blocks(a, b) {
        let tag = match (i < bi, j < bj) {
            (true, true) => Some(Tag::Replace),
            (true, false) => Some(Tag::Delete),
            (false, true) => Some(Tag::Insert),
            (false, false) => None,
        };
        if let Some(tag) = tag {
            codes.push(OpCode {
                tag,
                i1: i,
                i2: bi,
                j1: j,
                j2: bj,
            });
        }
        if size > 0 {
            codes.push(OpCode {
                tag: Tag::Equal,
                i1: bi,
                i2: bi + size,
                j1: bj,
                j2: bj + size,
            });
        }
        i = bi + size;
        j = bj + size;
    }
    codes
}

/// Split opcodes into hunks, trimming equal runs to `n` context lines.
fn grouped(opcodes: &[OpCode], n: usize) -> Vec<Vec<OpCode>> {
    let mut codes: Vec<OpCode> = opcodes.to_vec();
    if codes.iter().all(|c| c.tag == Tag::Equal) {
        return Vec::new();
    }
    if let Some(first) = codes.first_mut() {
        if first.tag == Tag::Equal {
            first.i1 = first.i1.max(first.i2.saturating_sub(n));
            first.j1 = first.j1.max(first.j2.saturating_sub(n));
        }
    }
    if let Some(last) = codes.last_mut() {
        if last.tag == Tag::Equal {
            last.i2 = last.i2.min(last.i1 + n);
            last.j2 = last.j2.min(last.j1 + n);
        }
    }

    let mut groups = Vec::new();
    let mut group: Vec<OpCode> = Vec::new();
    for code in codes {
        if code.tag == Tag::Equal && code.i2 - code.i1 > 2 * n {
            group.push(OpCode {
                tag: Tag::Equal,
                i1: code.i1,
                i2: (code.i1 + n).min(code.i2),
                j1: code.j1,
                j2: (code.j1 + n).min(code.j2),
            });
            groups.push(std::mem::take(&mut group));
            group.push(OpCode {
                tag: Tag::Equal,
                i1: code.i1.max(code.i2.saturating_sub(n)),
                i2: code.i2,
                j1: code.j1.max(code.j2.saturating_sub(n)),
                j2: code.j2,
            });
        } else {
            group.push(code);
        }
    }
    if !group.is_empty() && !(group.len() == 1 && group[0].tag == Tag::Equal) {
        groups.push(group);
    }
    groups
}
