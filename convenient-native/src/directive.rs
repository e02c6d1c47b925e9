//! Include directive scanner for C/C++ family sources
//!
//! A permissive, comment and string aware lexical scan, not a preprocessor:
//! - `#include "x.h"`, `#include <x.h>`, `#include MACRO`
//! - `#import` variants, when the toolchain treats them as includes
//! - `#define` / `#undef`, so the resolver can see macros defined earlier in
//!   the same file
//!
//! Conditional blocks are not evaluated. Only their nesting depth is tracked,
//! so an `#undef` inside one is known to possibly not apply.
//!
//! Malformed directives are skipped; they never abort the file.

use crate::types::{IncludeDirective, IncludeKind, MacroDirective, SourceDirectives};
use regex::Regex;
use tracing::debug;

/// Extracts include directives and local macro definitions from file text
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    imports_are_includes: bool,
    include_regex: Regex,
    define_regex: Regex,
    undef_regex: Regex,
    conditional_regex: Regex,
}

impl DirectiveParser {
    /// Create a parser; `imports_are_includes` enables `#import` handling.
    ///
    /// # Panics
    ///
    /// Never in practice: the patterns are fixed and known to compile.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(imports_are_includes: bool) -> Self {
        let include_regex = Regex::new(r"^\s*#\s*(include|import)(\s.*|[<\x22].*)?$")
            .expect("include pattern is valid");
        let define_regex = Regex::new(r"^\s*#\s*define\s+([A-Za-z_][A-Za-z0-9_]*)(\()?(.*)$")
            .expect("define pattern is valid");
        let undef_regex = Regex::new(r"^\s*#\s*undef\s+([A-Za-z_][A-Za-z0-9_]*)")
            .expect("undef pattern is valid");
        let conditional_regex = Regex::new(r"^\s*#\s*(ifdef|ifndef|if|endif)\b")
            .expect("conditional pattern is valid");

        Self {
            imports_are_includes,
            include_regex,
            define_regex,
            undef_regex,
            conditional_regex,
        }
    }

    /// Parse raw file bytes. Invalid UTF-8 is replaced, not rejected.
    #[must_use]
    pub fn parse_bytes(&self, bytes: &[u8]) -> SourceDirectives {
        self.parse(&String::from_utf8_lossy(bytes))
    }

    /// Parse file text into directives, in line order.
    #[must_use]
    pub fn parse(&self, text: &str) -> SourceDirectives {
        let mut directives = SourceDirectives::default();
        let mut depth = 0usize;

        for (line, content) in logical_lines(text) {
            if !content.trim_start().starts_with('#') {
                continue;
            }

            if let Some(caps) = self.conditional_regex.captures(&content) {
                if &caps[1] == "endif" {
                    depth = depth.saturating_sub(1);
                } else {
                    depth += 1;
                }
                continue;
            }

            if let Some(caps) = self.include_regex.captures(&content) {
                let import = &caps[1] == "import";
                if import && !self.imports_are_includes {
                    continue;
                }
                let rest = caps.get(2).map_or("", |m| m.as_str());
                match classify_target(rest) {
                    Some((kind, target)) => directives.includes.push(IncludeDirective {
                        kind,
                        target,
                        import,
                        line,
                    }),
                    None => debug!("Skipping malformed directive on line {}: {}", line, content.trim()),
                }
                continue;
            }

            if let Some(caps) = self.define_regex.captures(&content) {
                let name = caps[1].to_string();
                if caps.get(2).is_some() {
                    directives.macros.push(MacroDirective::DefineFunction { name, line });
                } else {
                    let value = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();
                    directives.macros.push(MacroDirective::Define { name, value, line });
                }
                continue;
            }

            if let Some(caps) = self.undef_regex.captures(&content) {
                directives.macros.push(MacroDirective::Undef {
                    name: caps[1].to_string(),
                    conditional: depth > 0,
                    line,
                });
            }
        }

        directives
    }
}

impl Default for DirectiveParser {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Classify the text after `#include`/`#import`.
fn classify_target(rest: &str) -> Option<(IncludeKind, String)> {
    let rest = rest.trim();
    let mut chars = rest.chars();
    match chars.next()? {
        '"' => {
            let body = &rest[1..];
            let end = body.find('"')?;
            let target = &body[..end];
            (!target.is_empty()).then(|| (IncludeKind::Quoted, target.to_string()))
        }
        '<' => {
            let body = &rest[1..];
            let end = body.find('>')?;
            let target = &body[..end];
            (!target.is_empty()).then(|| (IncludeKind::System, target.to_string()))
        }
        c if c == '_' || c.is_ascii_alphabetic() => {
            // Whatever follows the identifier (e.g. a macro call) stays in the
            // target and makes it unresolvable downstream
            Some((IncludeKind::MacroReference, rest.to_string()))
        }
        _ => None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    Literal(char),
    BlockComment,
    LineComment,
}

/// Split text into logical lines with comments removed.
///
/// Backslash-newline continuations and multi-line block comments join
/// physical lines; each logical line is tagged with the physical line it
/// starts on. String and character literals are kept verbatim so comment
/// markers inside them survive. An unterminated literal ends at the newline.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut state = LexState::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        // Line continuation, in any state
        if c == '\\' {
            let mut lookahead = chars.clone();
            if lookahead.peek() == Some(&'\r') {
                let _ = lookahead.next();
            }
            if lookahead.peek() == Some(&'\n') {
                let _ = lookahead.next();
                chars = lookahead;
                line += 1;
                continue;
            }
        }

        if c == '\n' {
            line += 1;
            match state {
                LexState::BlockComment => continue,
                LexState::Literal(_) | LexState::LineComment => state = LexState::Code,
                LexState::Code => {}
            }
            lines.push((start_line, std::mem::take(&mut current)));
            start_line = line;
            continue;
        }

        match state {
            LexState::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    let _ = chars.next();
                    state = LexState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    let _ = chars.next();
                    state = LexState::BlockComment;
                    current.push(' ');
                }
                '"' | '\'' => {
                    state = LexState::Literal(c);
                    current.push(c);
                }
                '\r' => {}
                _ => current.push(c),
            },
            LexState::Literal(quote) => {
                current.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.peek() {
                        if next != '\n' {
                            current.push(next);
                            let _ = chars.next();
                        }
                    }
                } else if c == quote {
                    state = LexState::Code;
                }
            }
            LexState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    let _ = chars.next();
                    state = LexState::Code;
                }
            }
            LexState::LineComment => {}
        }
    }

    if !current.is_empty() {
        lines.push((start_line, current));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn includes(text: &str) -> Vec<IncludeDirective> {
        DirectiveParser::new(true).parse(text).includes
    }

    #[test]
    fn test_quoted_system_and_macro() {
        let found = includes("#include \"util.h\"\n#include <stdio.h>\n#include CONFIG_HEADER\n");
        assert_eq!(
            found,
            vec![
                IncludeDirective::quoted("util.h", 1),
                IncludeDirective::system("stdio.h", 2),
                IncludeDirective::macro_reference("CONFIG_HEADER", 3),
            ]
        );
    }

    #[test]
    fn test_whitespace_variants() {
        let found = includes("  #  include   \"a.h\"\n#include<b.h>\n#include\"c.h\"\n\t#include <d/e.h> // trailing\n");
        let targets: Vec<_> = found.iter().map(|d| d.target.as_str()).collect();
        assert_eq!(targets, vec!["a.h", "b.h", "c.h", "d/e.h"]);
    }

    #[test]
    fn test_import_respects_toolchain_flag() {
        let text = "#import \"Foundation.h\"\n#include \"a.h\"\n";

        let with = DirectiveParser::new(true).parse(text).includes;
        assert_eq!(with.len(), 2);
        assert!(with[0].import);
        assert_eq!(with[0].kind, IncludeKind::Quoted);

        let without = DirectiveParser::new(false).parse(text).includes;
        assert_eq!(without, vec![IncludeDirective::quoted("a.h", 2)]);
    }

    #[test]
    fn test_comments_are_ignored() {
        let text = r#"// #include "line.h"
/* #include "block.h" */
/*
#include "multi.h"
*/
/* lead */ #include "real.h"
"#;
        let found = includes(text);
        assert_eq!(found, vec![IncludeDirective::quoted("real.h", 6)]);
    }

    #[test]
    fn test_comment_markers_inside_literals_survive() {
        let found = includes("#include \"odd/*name.h\"\n#include \"next.h\"\n");
        let targets: Vec<_> = found.iter().map(|d| d.target.as_str()).collect();
        assert_eq!(targets, vec!["odd/*name.h", "next.h"]);
    }

    #[test]
    fn test_line_continuation() {
        let found = includes("#include \\\n  \"split.h\"\n#include \"after.h\"\n");
        assert_eq!(
            found,
            vec![IncludeDirective::quoted("split.h", 1), IncludeDirective::quoted("after.h", 3)]
        );
    }

    #[test]
    fn test_malformed_directives_are_skipped() {
        let text = "#include \"unterminated.h\n#include <also\n#include\n#include 42\n#include \"\"\n#include \"ok.h\"\n";
        assert_eq!(includes(text), vec![IncludeDirective::quoted("ok.h", 6)]);
    }

    #[test]
    fn test_non_directive_text_is_ignored() {
        let text = "const char *s = \"#include \\\"x.h\\\"\";\n#include_next <y.h>\n#includes \"z.h\"\n";
        assert!(includes(text).is_empty());
    }

    #[test]
    fn test_macro_call_kept_as_reference() {
        let found = includes("#include PLATFORM_HEADER(io)\n");
        assert_eq!(found[0].kind, IncludeKind::MacroReference);
        assert_eq!(found[0].target, "PLATFORM_HEADER(io)");
    }

    #[test]
    fn test_defines_and_undefs() {
        let text = "#define HDR \"a.h\"\n#define CALL(x) x\n# undef HDR\n#define EMPTY\n";
        let macros = DirectiveParser::default().parse(text).macros;
        assert_eq!(
            macros,
            vec![
                MacroDirective::Define { name: "HDR".into(), value: "\"a.h\"".into(), line: 1 },
                MacroDirective::DefineFunction { name: "CALL".into(), line: 2 },
                MacroDirective::Undef { name: "HDR".into(), conditional: false, line: 3 },
                MacroDirective::Define { name: "EMPTY".into(), value: String::new(), line: 4 },
            ]
        );
    }

    #[test]
    fn test_undef_inside_conditional_block() {
        let text = "#undef A\n#ifdef X\n#  if Y\n#undef B\n#  endif\n#else\n#undef C\n#endif\n#undef D\n";
        let undefs: Vec<_> = DirectiveParser::default()
            .parse(text)
            .macros
            .into_iter()
            .filter_map(|m| match m {
                MacroDirective::Undef { name, conditional, .. } => Some((name, conditional)),
                _ => None,
            })
            .collect();
        assert_eq!(
            undefs,
            vec![
                ("A".to_string(), false),
                ("B".to_string(), true),
                ("C".to_string(), true),
                ("D".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_crlf_and_invalid_utf8() {
        let parser = DirectiveParser::default();
        let found = parser.parse_bytes(b"#include \"a.h\"\r\n\xff\xfe\r\n#include <b.h>\r\n").includes;
        assert_eq!(
            found,
            vec![IncludeDirective::quoted("a.h", 1), IncludeDirective::system("b.h", 3)]
        );
    }

    #[test]
    fn test_deterministic_order() {
        let text = "#include \"b.h\"\n#include \"a.h\"\n#include \"b.h\"\n";
        let first = includes(text);
        assert_eq!(first, includes(text));
        let targets: Vec<_> = first.iter().map(|d| d.target.as_str()).collect();
        assert_eq!(targets, vec!["b.h", "a.h", "b.h"]);
    }
}
