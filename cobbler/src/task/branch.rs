//! Deterministic branch naming for an issue.
//!
//! The review branch is `fix/issue-<N>-<slug(title)>`: lowercase, illegal
//! characters collapsed to `-`, at most 70 bytes, no trailing `-` or `.`.
//! The work branch is the same name under the `wip/` prefix. Sanitization is
//! idempotent so re-deriving the name from an already-derived name is safe.

const MAX_LEN: usize = 70;

/// The per-issue review branch name (the branch the pull request tracks).
pub fn source_branch(issue_number: u64, title: &str) -> String {
    let slug = slugify(title);
    let name = if slug.is_empty() {
        format!("fix/issue-{issue_number}")
    } else {
        format!("fix/issue-{issue_number}-{slug}")
    };
    clamp(&name)
}

/// The per-issue work branch: same name, `wip/` prefix.
pub fn work_branch(source_branch: &str) -> String {
    match source_branch.strip_prefix("fix/") {
        Some(rest) => format!("wip/{rest}"),
        None => format!("wip/{source_branch}"),
    }
}

/// Lowercases and keeps `[a-z0-9._]`, collapsing everything else into
/// single `-` separators. Output is pure ASCII.
fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Truncates to the length budget and trims trailing `-` / `.`.
fn clamp(name: &str) -> String {
    let cut = if name.len() > MAX_LEN {
        &name[..MAX_LEN]
    } else {
        name
    };
    cut.trim_end_matches(['-', '.']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_title() {
        assert_eq!(
            source_branch(42, "Fix typo in README"),
            "fix/issue-42-fix-typo-in-readme"
        );
    }

    #[test]
    fn illegal_characters_collapse_to_single_dash() {
        assert_eq!(
            source_branch(7, "Crash!!  when   ~parsing~ $PATH"),
            "fix/issue-7-crash-when-parsing-path"
        );
    }

    #[test]
    fn empty_title_still_names_the_issue() {
        assert_eq!(source_branch(9, "???"), "fix/issue-9");
    }

    #[test]
    fn long_title_is_clamped_without_trailing_punctuation() {
        let title = "a".repeat(200);
        let name = source_branch(1, &title);
        assert!(name.len() <= 70, "got {} bytes", name.len());
        assert!(!name.ends_with('-'));
        assert!(!name.ends_with('.'));
    }

    #[test]
    fn truncation_cannot_end_in_dash_or_dot() {
        // Engineer a name whose 70th byte lands right after a separator.
        let title = format!("{} trailing", "x".repeat(60));
        let name = source_branch(123, &title);
        assert!(!name.ends_with('-') && !name.ends_with('.'));
    }

    #[test]
    fn sanitization_is_idempotent() {
        for title in [
            "Weird  Título: ünicode & emoji 🎉 end.",
            "--already--slugged--",
            "MiXeD Case_with.dots",
        ] {
            let once = slugify(title);
            assert_eq!(slugify(&once), once, "slugify must be idempotent");
            assert_eq!(clamp(&clamp(&once)), clamp(&once));
        }
    }

    #[test]
    fn dots_and_underscores_survive() {
        assert_eq!(
            source_branch(3, "bump v1.2.3 to v1.2.4_rc"),
            "fix/issue-3-bump-v1.2.3-to-v1.2.4_rc"
        );
    }

    #[test]
    fn work_branch_swaps_the_prefix() {
        assert_eq!(
            work_branch("fix/issue-42-fix-typo-in-readme"),
            "wip/issue-42-fix-typo-in-readme"
        );
    }
}
