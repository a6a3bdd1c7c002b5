//! Reference matcher behaviour over a small fixed archive.

use quarry_backend::{search_archive, Archive, ArchiveFile, BackendError, PatternInfo};

fn archive() -> Archive {
    Archive::new(vec![
        ArchiveFile::new("README.md", "# Hello World\n\nHello world example in go"),
        ArchiveFile::new("file++.plus", "filename contains regex metachars"),
        ArchiveFile::new(
            "main.go",
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"Hello world\")\n}\n",
        ),
        ArchiveFile::new("abc.txt", "w"),
        ArchiveFile::new("milton.png", vec![0u8; 32 * 1024]),
        ArchiveFile::new("symlink", "abc.txt"),
    ])
}

/// Render results as `path:line:preview` lines, 1-based, the way a human reads them.
fn run(info: PatternInfo) -> String {
    let out = search_archive(&archive(), &info).unwrap();
    let mut lines = Vec::new();
    for fm in out.matches {
        if fm.line_matches.is_empty() {
            lines.push(fm.path.clone());
        }
        for lm in fm.line_matches {
            lines.push(format!("{}:{}:{}", fm.path, lm.line_number + 1, lm.preview));
        }
    }
    lines.join("\n")
}

fn pattern(p: &str) -> PatternInfo {
    PatternInfo {
        pattern: p.to_string(),
        ..Default::default()
    }
}

fn regexp(p: &str) -> PatternInfo {
    PatternInfo {
        pattern: p.to_string(),
        is_regexp: true,
        ..Default::default()
    }
}

#[test]
fn test_case_insensitive_literal() {
    assert_eq!(
        run(pattern("world")),
        "README.md:1:# Hello World\nREADME.md:3:Hello world example in go\nmain.go:6:\tfmt.Println(\"Hello world\")"
    );
}

#[test]
fn test_case_sensitive_literal() {
    let info = PatternInfo {
        is_case_sensitive: true,
        ..pattern("World")
    };
    assert_eq!(run(info), "README.md:1:# Hello World");
    assert_eq!(run(pattern("foo")), "");
}

#[test]
fn test_literal_is_not_a_regexp() {
    assert_eq!(run(pattern("func.*main")), "");
    assert_eq!(run(regexp("func.*main")), "main.go:5:func main() {");
}

#[test]
fn test_anchors_are_per_line() {
    assert_eq!(run(regexp("^func")), "main.go:5:func main() {");
    assert_eq!(run(regexp("^FuNc")), "main.go:5:func main() {");
    assert_eq!(run(regexp("^$")), "");
}

#[test]
fn test_word_match() {
    let word = |p: &str| PatternInfo {
        is_word_match: true,
        ..pattern(p)
    };
    assert_eq!(run(word("mai")), "");
    assert_eq!(
        run(word("main")),
        "main.go:1:package main\nmain.go:5:func main() {"
    );
}

#[test]
fn test_case_folding_keeps_escapes() {
    assert_eq!(
        run(regexp(r"printL\B")),
        "main.go:6:\tfmt.Println(\"Hello world\")"
    );
}

#[test]
fn test_include_and_exclude_globs() {
    let excluded = PatternInfo {
        exclude_pattern: "README.md".into(),
        ..pattern("world")
    };
    assert_eq!(run(excluded), "main.go:6:\tfmt.Println(\"Hello world\")");

    let md_only = PatternInfo {
        include_patterns: vec!["*.md".into()],
        ..pattern("world")
    };
    assert_eq!(
        run(md_only),
        "README.md:1:# Hello World\nREADME.md:3:Hello world example in go"
    );

    let all_must_match = PatternInfo {
        include_patterns: vec!["*.{md,txt}".into(), "*.txt".into()],
        ..pattern("w")
    };
    assert_eq!(run(all_must_match), "abc.txt:1:w");

    let case_sensitive = PatternInfo {
        include_patterns: vec!["*.{MD,go}".into()],
        path_patterns_are_case_sensitive: true,
        ..pattern("world")
    };
    assert_eq!(run(case_sensitive), "main.go:6:\tfmt.Println(\"Hello world\")");
}

#[test]
fn test_include_and_exclude_regexps() {
    let excluded = PatternInfo {
        exclude_pattern: r"README\.md".into(),
        path_patterns_are_regexps: true,
        ..pattern("world")
    };
    assert_eq!(run(excluded), "main.go:6:\tfmt.Println(\"Hello world\")");

    let both = PatternInfo {
        include_patterns: vec![r"\.(md|txt)".into(), "README".into()],
        path_patterns_are_regexps: true,
        ..pattern("w")
    };
    assert_eq!(
        run(both),
        "README.md:1:# Hello World\nREADME.md:3:Hello world example in go"
    );

    let case_sensitive = PatternInfo {
        include_patterns: vec![r"\.(MD|go)".into()],
        path_patterns_are_regexps: true,
        path_patterns_are_case_sensitive: true,
        ..pattern("world")
    };
    assert_eq!(run(case_sensitive), "main.go:6:\tfmt.Println(\"Hello world\")");
}

#[test]
fn test_empty_pattern_matches_paths() {
    let info = PatternInfo {
        include_patterns: vec![r"\.png".into()],
        path_patterns_are_regexps: true,
        pattern_matches_path: true,
        ..pattern("")
    };
    assert_eq!(run(info), "milton.png");
}

#[test]
fn test_multiline_regexps() {
    let multi = |p: &str| PatternInfo {
        pattern_matches_path: true,
        pattern_matches_content: true,
        path_patterns_are_regexps: true,
        ..regexp(p)
    };
    assert_eq!(
        run(multi("package main\n\nimport \"fmt\"")),
        "main.go:1:package main\nmain.go:2:\nmain.go:3:import \"fmt\""
    );
    assert_eq!(run(multi("package main\n")), "main.go:1:package main");
    assert_eq!(
        run(multi(r"package main\n\s*")),
        "main.go:1:package main\nmain.go:2:"
    );
    assert_eq!(run(multi("\nfunc")), "main.go:4:\nmain.go:5:func main() {");
    assert_eq!(
        run(multi(r"\n\s*func")),
        "main.go:3:import \"fmt\"\nmain.go:4:\nmain.go:5:func main() {"
    );
    assert_eq!(
        run(multi("\n")),
        [
            "README.md:1:# Hello World",
            "README.md:2:",
            "main.go:1:package main",
            "main.go:2:",
            "main.go:3:import \"fmt\"",
            "main.go:4:",
            "main.go:5:func main() {",
            "main.go:6:\tfmt.Println(\"Hello world\")",
            "main.go:7:}",
        ]
        .join("\n")
    );
}

#[test]
fn test_structural_takes_precedence_over_regexp() {
    let info = PatternInfo {
        include_patterns: vec!["file++.plus".into()],
        is_structural_pat: true,
        is_regexp: true,
        ..pattern("filename contains regex metachars")
    };
    assert_eq!(run(info), "file++.plus:1:filename contains regex metachars");
}

#[test]
fn test_structural_holes() {
    let info = PatternInfo {
        is_structural_pat: true,
        ..pattern("fmt.Println(:[args])")
    };
    assert_eq!(run(info), "main.go:6:\tfmt.Println(\"Hello world\")");
}

#[test]
fn test_negation_lists_non_matching_paths() {
    let negated = |p: PatternInfo| PatternInfo {
        is_negated: true,
        ..p
    };
    assert_eq!(
        run(negated(pattern("World"))),
        "abc.txt\nfile++.plus\nmilton.png\nsymlink"
    );
    assert_eq!(
        run(negated(PatternInfo {
            is_case_sensitive: true,
            ..pattern("World")
        })),
        "abc.txt\nfile++.plus\nmain.go\nmilton.png\nsymlink"
    );
    assert_eq!(
        run(negated(pattern("fmt"))),
        "README.md\nabc.txt\nfile++.plus\nmilton.png\nsymlink"
    );
}

#[test]
fn test_path_versus_content() {
    let both = PatternInfo {
        pattern_matches_path: true,
        pattern_matches_content: true,
        ..pattern("abc")
    };
    assert_eq!(run(both), "abc.txt\nsymlink:1:abc.txt");

    let content = PatternInfo {
        pattern_matches_content: true,
        ..pattern("abc")
    };
    assert_eq!(run(content), "symlink:1:abc.txt");

    let path = PatternInfo {
        pattern_matches_path: true,
        ..pattern("abc")
    };
    assert_eq!(run(path), "abc.txt");
}

#[test]
fn test_bad_requests() {
    let cases = vec![
        regexp(r"\F"),
        regexp("(?!id)entity"),
        PatternInfo {
            include_patterns: vec!["[c-a]".into()],
            ..pattern("test")
        },
        PatternInfo {
            exclude_pattern: "[c-a]".into(),
            ..pattern("test")
        },
        PatternInfo {
            include_patterns: vec!["**".into()],
            path_patterns_are_regexps: true,
            ..pattern("test")
        },
        PatternInfo {
            exclude_pattern: "**".into(),
            path_patterns_are_regexps: true,
            ..pattern("test")
        },
        PatternInfo {
            is_negated: true,
            is_structural_pat: true,
            path_patterns_are_regexps: true,
            ..pattern("fmt.Println(:[_])")
        },
    ];
    for info in cases {
        let res = search_archive(&archive(), &info);
        assert!(
            matches!(res, Err(BackendError::BadRequest(_))),
            "{info:?} expected to fail"
        );
    }
}
