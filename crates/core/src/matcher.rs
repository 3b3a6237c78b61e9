//! Filename matchers deciding which changed paths satisfy a rule's patterns.
//!
//! Two variants exist. `Glob` matches shell-style patterns against the final
//! path component only. `GitIgnore` (cargo feature `gitignore`) applies full
//! gitignore semantics to the whole relative path.

use globset::{GlobBuilder, GlobMatcher};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MATCHER: &str = "glob";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatcherError {
    #[error("invalid gitignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMatcher {
    Glob {
        case_insensitive: bool,
    },
    #[cfg(feature = "gitignore")]
    GitIgnore {
        case_insensitive: bool,
    },
}

impl Default for PatternMatcher {
    fn default() -> Self {
        PatternMatcher::Glob {
            case_insensitive: false,
        }
    }
}

/// Picks the matcher for a configured kind. Unknown or unavailable kinds fall back to glob.
pub fn select(kind: &str, case_insensitive: bool) -> PatternMatcher {
    info!(
        matcher = kind,
        gitignore_available = cfg!(feature = "gitignore"),
        "selecting filename matcher"
    );
    let glob = PatternMatcher::Glob { case_insensitive };
    match kind.trim() {
        "" | "glob" | "fnmatch" => glob,
        "gitignore" => gitignore_or(glob, case_insensitive),
        other => {
            warn!("unknown matcher kind '{}', falling back to glob", other);
            glob
        }
    }
}

#[cfg(feature = "gitignore")]
fn gitignore_or(_glob: PatternMatcher, case_insensitive: bool) -> PatternMatcher {
    PatternMatcher::GitIgnore { case_insensitive }
}

#[cfg(not(feature = "gitignore"))]
fn gitignore_or(glob: PatternMatcher, _case_insensitive: bool) -> PatternMatcher {
    warn!("gitignore matching requires the `gitignore` feature, falling back to glob");
    glob
}

impl PatternMatcher {
    pub fn kind(&self) -> &'static str {
        match self {
            PatternMatcher::Glob { .. } => "glob",
            #[cfg(feature = "gitignore")]
            PatternMatcher::GitIgnore { .. } => "gitignore",
        }
    }

    /// Compiles a pattern list once so it can be applied to many file lists.
    ///
    /// Glob patterns that fail to parse are skipped; they simply match
    /// nothing. A gitignore pattern that fails to compile is an error.
    pub fn compile<S: AsRef<str>>(&self, patterns: &[S]) -> Result<CompiledPatterns, MatcherError> {
        match *self {
            PatternMatcher::Glob { case_insensitive } => {
                Ok(CompiledPatterns::Glob(compile_globs(patterns, case_insensitive)))
            }
            #[cfg(feature = "gitignore")]
            PatternMatcher::GitIgnore { case_insensitive } => {
                compile_gitignore(patterns, case_insensitive).map(CompiledPatterns::GitIgnore)
            }
        }
    }

    /// Paths from `files` matching any of `patterns`, lazily and in `files` order.
    pub fn match_files<'a, S, F>(
        &self,
        patterns: &[S],
        files: &'a [F],
    ) -> Result<MatchedFiles<'a, F>, MatcherError>
    where
        S: AsRef<str>,
        F: AsRef<str>,
    {
        let compiled = self.compile(patterns)?;
        Ok(MatchedFiles {
            patterns: Cow::Owned(compiled),
            files: files.iter(),
        })
    }
}

fn compile_globs<S: AsRef<str>>(patterns: &[S], case_insensitive: bool) -> Vec<GlobMatcher> {
    patterns
        .iter()
        .map(S::as_ref)
        .filter(|p| !p.is_empty())
        .filter_map(|pattern| {
            match GlobBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .literal_separator(true)
                .build()
            {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(e) => {
                    warn!("skipping malformed glob pattern '{}': {}", pattern, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(feature = "gitignore")]
fn compile_gitignore<S: AsRef<str>>(
    patterns: &[S],
    case_insensitive: bool,
) -> Result<ignore::gitignore::Gitignore, MatcherError> {
    use ignore::gitignore::GitignoreBuilder;

    let invalid = |pattern: &str, e: ignore::Error| MatcherError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    };
    let mut builder = GitignoreBuilder::new("");
    builder
        .case_insensitive(case_insensitive)
        .map_err(|e| invalid("", e))?;
    for pattern in patterns.iter().map(S::as_ref) {
        builder
            .add_line(None, pattern)
            .map_err(|e| invalid(pattern, e))?;
    }
    builder.build().map_err(|e| invalid("", e))
}

#[derive(Debug, Clone)]
pub enum CompiledPatterns {
    Glob(Vec<GlobMatcher>),
    #[cfg(feature = "gitignore")]
    GitIgnore(ignore::gitignore::Gitignore),
}

impl CompiledPatterns {
    pub fn is_match(&self, path: &str) -> bool {
        match self {
            CompiledPatterns::Glob(globs) => {
                let name = basename(path);
                globs.iter().any(|g| g.is_match(name))
            }
            #[cfg(feature = "gitignore")]
            CompiledPatterns::GitIgnore(gitignore) => {
                let relative = path.trim_start_matches('/');
                !relative.is_empty()
                    && gitignore
                        .matched_path_or_any_parents(relative, false)
                        .is_ignore()
            }
        }
    }

    pub fn match_files<'a, F: AsRef<str>>(&'a self, files: &'a [F]) -> MatchedFiles<'a, F> {
        MatchedFiles {
            patterns: Cow::Borrowed(self),
            files: files.iter(),
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub struct MatchedFiles<'a, F> {
    patterns: Cow<'a, CompiledPatterns>,
    files: std::slice::Iter<'a, F>,
}

impl<'a, F: AsRef<str>> Iterator for MatchedFiles<'a, F> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let patterns = &self.patterns;
        self.files
            .by_ref()
            .map(F::as_ref)
            .find(|path| patterns.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob() -> PatternMatcher {
        PatternMatcher::default()
    }

    fn matched<'a>(m: PatternMatcher, patterns: &[&str], files: &'a [&'a str]) -> Vec<&'a str> {
        m.match_files(patterns, files).unwrap().collect()
    }

    #[test]
    fn glob_matches_basename_in_file_order() {
        let files = ["src/main.go", "src/app.css", "web/index.html", "README"];
        let got = matched(glob(), &["*.html", "*.css"], &files);
        assert_eq!(got, vec!["src/app.css", "web/index.html"]);
    }

    #[test]
    fn glob_yields_each_path_once() {
        let files = ["a/b/style.css"];
        let got = matched(glob(), &["*.css", "style.*", "s?yle.css"], &files);
        assert_eq!(got, vec!["a/b/style.css"]);
    }

    #[test]
    fn glob_never_matches_directories_in_the_pattern() {
        let files = ["build/output.o", "rebuild/output.o"];
        assert!(matched(glob(), &["build/"], &files).is_empty());
        assert!(matched(glob(), &["src/*.c"], &["src/main.c"]).is_empty());
    }

    #[test]
    fn glob_character_classes() {
        let files = ["lib/a1.rs", "lib/b1.rs", "lib/c1.rs"];
        assert_eq!(matched(glob(), &["[ab]1.rs"], &files), vec!["lib/a1.rs", "lib/b1.rs"]);
        assert_eq!(matched(glob(), &["[!ab]1.rs"], &files), vec!["lib/c1.rs"]);
    }

    #[test]
    fn malformed_glob_pattern_only_disables_itself() {
        let files = ["docs/a.md", "src/lib.rs"];
        let got = matched(glob(), &["[unclosed", "*.md"], &files);
        assert_eq!(got, vec!["docs/a.md"]);
    }

    #[test]
    fn glob_case_sensitivity_is_configurable() {
        let files = ["src/App.CSS"];
        assert!(matched(glob(), &["*.css"], &files).is_empty());
        let ci = PatternMatcher::Glob {
            case_insensitive: true,
        };
        assert_eq!(matched(ci, &["*.css"], &files), vec!["src/App.CSS"]);
    }

    #[test]
    fn factory_falls_back_to_glob() {
        assert_eq!(select("", false).kind(), "glob");
        assert_eq!(select("fnmatch", false).kind(), "glob");
        assert_eq!(select("regex", false).kind(), "glob");
        assert_eq!(
            select("  ", true),
            PatternMatcher::Glob {
                case_insensitive: true
            }
        );
    }

    #[cfg(feature = "gitignore")]
    mod gitignore {
        use super::*;

        fn gi() -> PatternMatcher {
            select("gitignore", false)
        }

        #[test]
        fn factory_selects_gitignore() {
            assert_eq!(gi().kind(), "gitignore");
        }

        #[test]
        fn directory_pattern_matches_full_path() {
            let files = ["build/output.o", "rebuild/output.o", "src/build/x.o"];
            let got = matched(gi(), &["build/"], &files);
            assert_eq!(got, vec!["build/output.o", "src/build/x.o"]);
        }

        #[test]
        fn anchored_and_double_star_patterns() {
            let files = ["docs/guide.md", "src/docs/x.md", "a/b/c/test.py"];
            assert_eq!(matched(gi(), &["/docs/"], &files), vec!["docs/guide.md"]);
            assert_eq!(matched(gi(), &["a/**/test.py"], &files), vec!["a/b/c/test.py"]);
        }

        #[test]
        fn negation_excludes_paths() {
            let files = ["web/app.css", "web/vendor.css"];
            let got = matched(gi(), &["*.css", "!vendor.css"], &files);
            assert_eq!(got, vec!["web/app.css"]);
        }

        #[test]
        fn leading_slash_in_paths_is_ignored() {
            let files = ["/trunk/build/a.o"];
            assert_eq!(matched(gi(), &["trunk/build/"], &files), vec!["/trunk/build/a.o"]);
        }

        #[test]
        fn compile_error_names_the_bad_pattern() {
            for bad in ["a{b", "[z-a]"] {
                let err = gi().compile(&["*.rs", bad]).unwrap_err();
                let MatcherError::InvalidPattern { pattern, .. } = err;
                assert_eq!(pattern, bad);
            }
        }
    }
}
