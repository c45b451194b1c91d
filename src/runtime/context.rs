// ABOUTME: Tar packing of a local build context.
// ABOUTME: Applies .dockerignore with the engine CLI's matching rules and always skips .git.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("build context not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid .dockerignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to pack build context: {0}")]
    Io(#[from] std::io::Error),
}

/// Pack `dir` into an in-memory tar archive suitable for the engine build API.
///
/// `dockerfile` and `.dockerignore` are always sent, even when a pattern
/// matches them, since the engine needs both to run the build.
pub fn pack_build_context(dir: &Path, dockerfile: &str) -> Result<Vec<u8>, ContextError> {
    if !dir.is_dir() {
        return Err(ContextError::NotFound(dir.to_path_buf()));
    }

    let ignore = IgnoreList::load(dir, dockerfile)?;
    let mut ar = tar::Builder::new(Vec::new());
    ar.follow_symlinks(false);

    let mut stack = vec![PathBuf::new()];
    while let Some(rel_dir) = stack.pop() {
        let mut entries: Vec<_> = fs::read_dir(dir.join(&rel_dir))?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let rel = rel_dir.join(entry.file_name());
            let rel_str = slash_path(&rel);
            let file_type = entry.file_type()?;
            let excluded = ignore.excludes(&rel_str);

            if file_type.is_dir() {
                if !excluded {
                    ar.append_dir(&rel, entry.path())?;
                    stack.push(rel);
                } else if ignore.may_reinclude_under(&rel_str) {
                    // Excluded itself, but an exception may bring back an entry below it.
                    stack.push(rel);
                }
            } else if !excluded {
                ar.append_path_with_name(entry.path(), &rel)?;
            }
        }
    }

    Ok(ar.into_inner()?)
}

fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// One `.dockerignore` line.
#[derive(Debug)]
struct Pattern {
    cleaned: String,
    regex: Regex,
    exception: bool,
}

impl Pattern {
    fn parse(line: &str) -> Result<Option<Self>, ContextError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (exception, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let cleaned = clean(body);
        if cleaned.is_empty() {
            return Ok(None);
        }
        let regex = Regex::new(&to_regex(&cleaned)).map_err(|source| ContextError::Pattern {
            pattern: line.to_string(),
            source,
        })?;
        Ok(Some(Self {
            cleaned,
            regex,
            exception,
        }))
    }

    /// True when the pattern matches `path` or one of its parent directories.
    fn matches(&self, path: &str) -> bool {
        if self.regex.is_match(path) {
            return true;
        }
        let mut end = 0;
        while let Some(offset) = path[end..].find('/') {
            end += offset;
            if self.regex.is_match(&path[..end]) {
                return true;
            }
            end += 1;
        }
        false
    }
}

/// Lexical cleanup the engine CLI applies before matching: no leading `/`
/// or `./`, no empty or `.` segments, `..` folded.
fn clean(pattern: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in pattern.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Translate a glob into an anchored regex: `*` and `?` stay within one path
/// segment, `**` spans segments and `[...]` classes pass through.
fn to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                if chars.get(i) == Some(&'/') {
                    i += 1;
                    if i == chars.len() {
                        out.push_str(".*");
                    } else {
                        out.push_str("(.*/)?");
                    }
                } else {
                    out.push_str(".*");
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..].iter().position(|&c| c == ']');
                match close {
                    Some(len) => {
                        out.push('[');
                        let class: String = chars[i + 1..i + 1 + len].iter().collect();
                        match class.strip_prefix('!').or_else(|| class.strip_prefix('^')) {
                            Some(rest) => {
                                out.push('^');
                                out.push_str(&escape_class(rest));
                            }
                            None => out.push_str(&escape_class(&class)),
                        }
                        out.push(']');
                        i += len + 2;
                        continue;
                    }
                    None => out.push_str(&regex::escape("[")),
                }
            }
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

fn escape_class(class: &str) -> String {
    class
        .chars()
        .map(|c| match c {
            '[' | ']' | '\\' | '&' | '~' => format!("\\{}", c),
            other => other.to_string(),
        })
        .collect()
}

/// Ordered `.dockerignore` rules; the last matching line decides.
struct IgnoreList {
    patterns: Vec<Pattern>,
}

impl IgnoreList {
    fn load(dir: &Path, dockerfile: &str) -> Result<Self, ContextError> {
        let mut lines = vec![".git".to_string()];
        match fs::read_to_string(dir.join(".dockerignore")) {
            Ok(content) => lines.extend(content.lines().map(str::to_string)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        lines.push(format!("!{}", dockerfile));
        lines.push("!.dockerignore".to_string());

        let mut patterns = Vec::new();
        for line in &lines {
            if let Some(pattern) = Pattern::parse(line)? {
                patterns.push(pattern);
            }
        }
        Ok(Self { patterns })
    }

    fn excludes(&self, path: &str) -> bool {
        let mut excluded = false;
        for pattern in &self.patterns {
            // An exception only matters once excluded, and vice versa.
            if pattern.exception != excluded {
                continue;
            }
            if pattern.matches(path) {
                excluded = !pattern.exception;
            }
        }
        excluded
    }

    /// Whether an exception could re-include something inside the excluded
    /// directory `dir`.
    fn may_reinclude_under(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir);
        self.patterns.iter().any(|p| {
            p.exception && (p.cleaned.starts_with(&prefix) || p.cleaned.starts_with("**"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_names(data: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(data);
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn ignore(lines: &str) -> IgnoreList {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".dockerignore"), lines).unwrap();
        IgnoreList::load(dir.path(), "Dockerfile").unwrap()
    }

    #[test]
    fn packs_files_and_skips_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "Dockerfile", "FROM scratch\n");
        write(root, "src/tools.py", "def f(): pass\n");
        write(root, "cache.pyc", "x");
        write(root, ".git/HEAD", "ref");
        write(root, "output/result.csv", "a,b");
        write(root, ".dockerignore", "# comment\noutput/\n*.pyc\n");

        let names = entry_names(&pack_build_context(root, "Dockerfile").unwrap());

        assert!(names.iter().any(|n| n == "Dockerfile"));
        assert!(names.iter().any(|n| n == "src/tools.py"));
        assert!(!names.iter().any(|n| n.starts_with(".git")));
        assert!(!names.iter().any(|n| n.starts_with("output")));
        assert!(!names.iter().any(|n| n == "cache.pyc"));
    }

    #[test]
    fn stale_bytecode_at_any_depth_is_not_shipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "Dockerfile", "FROM python:3.12-slim\n");
        write(root, "README.md", "# app\n");
        write(root, "NOTES.md", "scratch\n");
        write(root, "src/tools.py", "def f(): pass\n");
        write(root, "src/__pycache__/tools.cpython-312.pyc", "stale");
        write(root, ".dockerignore", "**/__pycache__\n*.md\n!README.md\n");

        let names = entry_names(&pack_build_context(root, "Dockerfile").unwrap());

        assert!(
            !names.iter().any(|n| n.contains("__pycache__")),
            "stale bytecode shipped: {:?}",
            names
        );
        assert!(names.iter().any(|n| n == "README.md"), "{:?}", names);
        assert!(!names.iter().any(|n| n == "NOTES.md"));
        assert!(names.iter().any(|n| n == "src/tools.py"));
    }

    #[test]
    fn exception_reaches_into_excluded_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "Dockerfile", "FROM scratch\n");
        write(root, "data/big.bin", "x");
        write(root, "data/schema.json", "{}");
        write(root, ".dockerignore", "data\n!data/schema.json\n");

        let names = entry_names(&pack_build_context(root, "Dockerfile").unwrap());

        assert!(names.iter().any(|n| n == "data/schema.json"), "{:?}", names);
        assert!(!names.iter().any(|n| n == "data/big.bin"));
    }

    #[test]
    fn dockerfile_is_sent_even_when_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "Containerfile", "FROM scratch\n");
        write(root, ".dockerignore", "*\n");

        let names = entry_names(&pack_build_context(root, "Containerfile").unwrap());

        assert_eq!(names, vec![".dockerignore", "Containerfile"]);
    }

    #[test]
    fn single_star_stays_in_one_segment() {
        let list = ignore("*.md\nsrc/*.py\n");
        assert!(list.excludes("NOTES.md"));
        assert!(!list.excludes("docs/NOTES.md"));
        assert!(list.excludes("src/tools.py"));
        assert!(!list.excludes("src/pkg/tools.py"));
    }

    #[test]
    fn double_star_spans_segments() {
        let list = ignore("**/*.pyc\nbuild/**\n");
        assert!(list.excludes("a.pyc"));
        assert!(list.excludes("src/pkg/a.pyc"));
        assert!(list.excludes("build/out/x.o"));
        assert!(!list.excludes("src/tools.py"));
    }

    #[test]
    fn last_matching_line_wins() {
        let list = ignore("*.md\n!README.md\nREADME.md\n");
        assert!(list.excludes("README.md"));
    }

    #[test]
    fn leading_slash_and_dot_segments_are_cleaned() {
        let list = ignore("/output\n./logs/\n");
        assert!(list.excludes("output"));
        assert!(list.excludes("output/run.csv"));
        assert!(list.excludes("logs/app.log"));
    }

    #[test]
    fn question_mark_and_classes() {
        let list = ignore("file?.txt\n[ab].log\n[!c]x\n");
        assert!(list.excludes("file1.txt"));
        assert!(!list.excludes("file10.txt"));
        assert!(list.excludes("a.log"));
        assert!(!list.excludes("c.log"));
        assert!(list.excludes("dx"));
        assert!(!list.excludes("cx"));
    }

    #[test]
    fn missing_directory_is_reported() {
        let err = pack_build_context(Path::new("/nonexistent/shipit-context"), "Dockerfile")
            .unwrap_err();
        assert!(matches!(err, ContextError::NotFound(_)));
    }
}
