use regex::Regex;
use lazy_static::lazy_static;
use crate::utils::{quote, error};
use crate::error::ProtoError;

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(concat!(
        r"(",
        r"/\*[\s\S]*?\*/|//[^\n]*|\s+",
        r#"|"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'"#,
        r"|-?(?:0[xX][0-9A-Fa-f]+|\d+\.\d*(?:[eE][+-]?\d+)?|\.\d+(?:[eE][+-]?\d+)?|\d+(?:[eE][+-]?\d+)?)",
        r"|\.?[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*",
        r"|[=;{}\[\]()<>,:\-]",
        r")"
    )).unwrap();
    pub static ref SKIPPED_RX: Regex = Regex::new(r"^(?:/\*[\s\S]*\*/|//.*|\s+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

impl Token {
    pub fn is_string(&self) -> bool {
        self.text.starts_with('"') || self.text.starts_with('\'')
    }
}

/// Splits schema text into tokens, dropping whitespace and comments. The
/// last token is always an empty end-of-input marker.
pub fn tokenize_schema(text: &str) -> Result<Vec<Token>, ProtoError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let end   = mat.end();
        let part  = mat.as_str();

        if start > last_end {
            let unexpected = &text[last_end..start];
            return Err(error(
                &format!("Syntax error: {}", quote(unexpected)),
                line,
                column,
            ));
        }

        if !SKIPPED_RX.is_match(part) {
            tokens.push(Token {
                text:   part.to_string(),
                line,
                column,
            });
        }

        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.len() + 1;
            }
        } else {
            column += part.len();
        }

        last_end = end;
    }

    if last_end != text.len() {
        let unexpected = &text[last_end..];
        return Err(error(
            &format!("Syntax error: {}", quote(unexpected)),
            line,
            column,
        ));
    }

    tokens.push(Token {
        text:   "".to_string(),
        line,
        column,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        tokenize_schema(input).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_tokenize_simple() {
        let input = "int32 x = 10;";
        let expected = vec![
            Token { text: "int32".into(), line: 1, column: 1 },
            Token { text: "x".into(),     line: 1, column: 7 },
            Token { text: "=".into(),     line: 1, column: 9 },
            Token { text: "10".into(),    line: 1, column: 11 },
            Token { text: ";".into(),     line: 1, column: 13 },
            Token { text: "".into(),      line: 1, column: 14 },
        ];
        let got = tokenize_schema(input).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_tokenize_comments_and_lines() {
        let input = "// header\nmessage /* a\nb */ M {}";
        let got = tokenize_schema(input).unwrap();
        assert_eq!(got[0], Token { text: "message".into(), line: 2, column: 1 });
        assert_eq!(got[1], Token { text: "M".into(), line: 3, column: 6 });
        assert_eq!(got.len(), 5);
    }

    #[test]
    fn test_tokenize_literals() {
        assert_eq!(
            texts(r#"x = "a\"b" 'c' -5 0x1F 1.5e3 -inf;"#),
            vec!["x", "=", r#""a\"b""#, "'c'", "-5", "0x1F", "1.5e3", "-", "inf", ";", ""]
        );
    }

    #[test]
    fn test_tokenize_dotted_names() {
        assert_eq!(
            texts("map<string, .pkg.Outer.Inner> m = 1 [(my.opt).sub = true];"),
            vec![
                "map", "<", "string", ",", ".pkg.Outer.Inner", ">", "m", "=", "1",
                "[", "(", "my.opt", ")", ".sub", "=", "true", "]", ";", "",
            ]
        );
    }

    #[test]
    fn test_tokenize_unexpected_text() {
        let input = "int32 x = 10 @";
        let err = tokenize_schema(input).unwrap_err();
        assert!(
            matches!(err, ProtoError::ParseError { line: 1, column: 14, .. }),
            "expected a ParseError but got {:?}",
            err
        );
    }
}
