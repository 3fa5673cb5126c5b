#![forbid(unsafe_code)]

use std::fmt;

use crate::error::SolverError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub(crate) fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(a) => Some(a),
            Sexp::List(_) => None,
        }
    }

    pub(crate) fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            Sexp::Atom(_) => None,
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(a) => f.write_str(a),
            Sexp::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Parses every top-level expression in `src`. `|quoted|` symbols lose their
/// bars; string literals keep their quotes.
pub(crate) fn parse_all(src: &str) -> Result<Vec<Sexp>, SolverError> {
    let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
    let mut chars = src.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            ';' => {
                while chars.next_if(|(_, c)| *c != '\n').is_some() {}
            }
            '(' => stack.push(Vec::new()),
            ')' => {
                let list = stack
                    .pop()
                    .filter(|_| !stack.is_empty())
                    .ok_or_else(|| SolverError::Parse(format!("unbalanced `)` at byte {pos}")))?;
                push(&mut stack, Sexp::List(list));
            }
            '|' => {
                let mut sym = String::new();
                loop {
                    match chars.next() {
                        Some((_, '|')) => break,
                        Some((_, c)) => sym.push(c),
                        None => return Err(SolverError::Parse("unterminated `|` symbol".into())),
                    }
                }
                push(&mut stack, Sexp::Atom(sym));
            }
            '"' => {
                let mut lit = String::from('"');
                loop {
                    match chars.next() {
                        // `""` is an escaped quote inside SMT-LIB strings.
                        Some((_, '"')) if chars.next_if(|(_, c)| *c == '"').is_some() => {
                            lit.push_str("\"\"");
                        }
                        Some((_, '"')) => break,
                        Some((_, c)) => lit.push(c),
                        None => return Err(SolverError::Parse("unterminated string".into())),
                    }
                }
                lit.push('"');
                push(&mut stack, Sexp::Atom(lit));
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = String::from(c);
                while let Some((_, c)) =
                    chars.next_if(|(_, c)| !c.is_whitespace() && !"()|\";".contains(*c))
                {
                    atom.push(c);
                }
                push(&mut stack, Sexp::Atom(atom));
            }
        }
    }

    match stack.pop() {
        Some(top) if stack.is_empty() => Ok(top),
        _ => Err(SolverError::Parse("unbalanced `(` in solver output".into())),
    }
}

fn push(stack: &mut [Vec<Sexp>], sexp: Sexp) {
    if let Some(top) = stack.last_mut() {
        top.push(sexp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> Sexp {
        Sexp::Atom(s.to_string())
    }

    #[test]
    fn parses_get_value_response() {
        let out = "sat\n((x 5)\n (|weird name| (- 1)))\n";
        let parsed = parse_all(out).expect("parse");
        assert_eq!(parsed[0], atom("sat"));
        let pairs = parsed[1].as_list().expect("list");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].as_list().map(|p| p[0].clone()), Some(atom("weird name")));
        assert_eq!(pairs[1].as_list().map(|p| p[1].to_string()), Some("(- 1)".to_string()));
    }

    #[test]
    fn strings_and_comments() {
        let parsed = parse_all("; banner\n(error \"line 1: \"\"x\"\" unknown\")").expect("parse");
        assert_eq!(
            parsed,
            vec![Sexp::List(vec![atom("error"), atom("\"line 1: \"\"x\"\" unknown\"")])]
        );
    }

    #[test]
    fn rejects_unbalanced() {
        assert!(parse_all("((a)").is_err());
        assert!(parse_all("a)").is_err());
    }
}
