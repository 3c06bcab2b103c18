use crate::ast::{Expr, RedirKind, SeqOp};

/// One lexed piece of an input line.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    /// `;`
    Semi,
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
    /// `|`
    Pipe,
    /// `&`
    Amp,
    /// `<`
    Less,
    /// `>`
    Great,
    /// `>>`
    DGreat,
    /// `2>`
    ErrGreat,
    /// `&>`
    BothGreat,
    /// `(`
    LParen,
    /// `)`
    RParen,
}

fn token_name(token: &Token) -> &'static str {
    match token {
        Token::Word(_) => "word",
        Token::Semi => "';'",
        Token::AndIf => "'&&'",
        Token::OrIf => "'||'",
        Token::Pipe => "'|'",
        Token::Amp => "'&'",
        Token::Less => "'<'",
        Token::Great => "'>'",
        Token::DGreat => "'>>'",
        Token::ErrGreat => "'2>'",
        Token::BothGreat => "'&>'",
        Token::LParen => "'('",
        Token::RParen => "')'",
    }
}

fn flush_word(tokens: &mut Vec<Token>, current: &mut String, has_word: &mut bool) {
    if *has_word || !current.is_empty() {
        tokens.push(Token::Word(std::mem::take(current)));
        *has_word = false;
    }
}

/// Split an input line into words and operators. Single quotes are fully
/// literal; double quotes keep whitespace and operators but let backslash
/// escape a few characters; a bare backslash escapes the next character.
fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut has_word = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                has_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                has_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some(c) => current.push(c),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => {
                has_word = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c if c.is_whitespace() => flush_word(&mut tokens, &mut current, &mut has_word),
            // An unquoted `2>` at the start of a word targets stderr.
            '2' if current.is_empty() && !has_word && chars.peek() == Some(&'>') => {
                chars.next();
                tokens.push(Token::ErrGreat);
            }
            ';' => {
                flush_word(&mut tokens, &mut current, &mut has_word);
                tokens.push(Token::Semi);
            }
            '(' => {
                flush_word(&mut tokens, &mut current, &mut has_word);
                tokens.push(Token::LParen);
            }
            ')' => {
                flush_word(&mut tokens, &mut current, &mut has_word);
                tokens.push(Token::RParen);
            }
            '&' => {
                flush_word(&mut tokens, &mut current, &mut has_word);
                match chars.peek() {
                    Some('&') => {
                        chars.next();
                        tokens.push(Token::AndIf);
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::BothGreat);
                    }
                    _ => tokens.push(Token::Amp),
                }
            }
            '|' => {
                flush_word(&mut tokens, &mut current, &mut has_word);
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::OrIf);
                } else {
                    tokens.push(Token::Pipe);
                }
            }
            '<' => {
                flush_word(&mut tokens, &mut current, &mut has_word);
                tokens.push(Token::Less);
            }
            '>' => {
                flush_word(&mut tokens, &mut current, &mut has_word);
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::DGreat);
                } else {
                    tokens.push(Token::Great);
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }

    flush_word(&mut tokens, &mut current, &mut has_word);
    Ok(tokens)
}

/// Parse an input line into an expression tree. A blank line parses to
/// [`Expr::Empty`].
pub fn parse_line(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Expr::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_sequence()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("syntax error near {}", token_name(token))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn starts_command(&self) -> bool {
        matches!(self.peek(), Some(Token::Word(_)) | Some(Token::LParen))
    }

    /// `job (';' job)*`, where a trailing `&` also separates jobs, so
    /// `sleep 1 & jobs` reads as a two-step sequence.
    fn parse_sequence(&mut self) -> Result<Expr, String> {
        let (mut left, mut backgrounded) = self.parse_job()?;
        loop {
            if self.eat(&Token::Semi) {
                if !self.starts_command() {
                    break;
                }
            } else if !(backgrounded && self.starts_command()) {
                break;
            }
            let (right, bg) = self.parse_job()?;
            backgrounded = bg;
            left = Expr::Sequence {
                op: SeqOp::Always,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// An and/or chain with an optional trailing `&`.
    fn parse_job(&mut self) -> Result<(Expr, bool), String> {
        let expr = self.parse_and_or()?;
        if self.eat(&Token::Amp) {
            Ok((Expr::Background(Box::new(expr)), true))
        } else {
            Ok((expr, false))
        }
    }

    fn parse_and_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_pipeline()?;
        loop {
            let op = if self.eat(&Token::AndIf) {
                SeqOp::And
            } else if self.eat(&Token::OrIf) {
                SeqOp::Or
            } else {
                break;
            };
            let right = self.parse_pipeline()?;
            left = Expr::Sequence {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_pipeline(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_command()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_command()?;
            left = Expr::Pipe {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// A simple command or a parenthesized group, with any redirections
    /// attached around it.
    fn parse_command(&mut self) -> Result<Expr, String> {
        let mut redirs: Vec<(RedirKind, String)> = Vec::new();
        let base = if self.eat(&Token::LParen) {
            let inner = self.parse_sequence()?;
            if !self.eat(&Token::RParen) {
                return Err("expected ')'".to_string());
            }
            self.collect_redirections(&mut redirs)?;
            inner
        } else {
            let mut argv: Vec<String> = Vec::new();
            loop {
                if let Some(Token::Word(_)) = self.peek() {
                    if let Some(Token::Word(word)) = self.advance() {
                        argv.push(word);
                    }
                } else if !self.collect_one_redirection(&mut redirs)? {
                    break;
                }
            }
            if argv.is_empty() {
                return Err(match self.peek() {
                    Some(token) => format!("syntax error near {}", token_name(token)),
                    None => "missing command".to_string(),
                });
            }
            Expr::Simple { argv }
        };

        // The last redirection listed for a descriptor is the one applied
        // closest to the command, so it wins.
        let mut expr = base;
        for (kind, file) in redirs.into_iter().rev() {
            expr = Expr::Redirect {
                kind,
                file,
                body: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn collect_redirections(
        &mut self,
        redirs: &mut Vec<(RedirKind, String)>,
    ) -> Result<(), String> {
        while self.collect_one_redirection(redirs)? {}
        Ok(())
    }

    fn collect_one_redirection(
        &mut self,
        redirs: &mut Vec<(RedirKind, String)>,
    ) -> Result<bool, String> {
        let (kind, op) = match self.peek() {
            Some(Token::Less) => (RedirKind::In, "'<'"),
            Some(Token::Great) => (RedirKind::Out, "'>'"),
            Some(Token::DGreat) => (RedirKind::Append, "'>>'"),
            Some(Token::ErrGreat) => (RedirKind::Err, "'2>'"),
            Some(Token::BothGreat) => (RedirKind::ErrOut, "'&>'"),
            _ => return Ok(false),
        };
        self.pos += 1;
        match self.advance() {
            Some(Token::Word(file)) => {
                redirs.push((kind, file));
                Ok(true)
            }
            _ => Err(format!("expected filename after {op}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(words: &[&str]) -> Expr {
        Expr::Simple {
            argv: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    fn blank_line_is_empty() {
        assert_eq!(parse_line("").unwrap(), Expr::Empty);
        assert_eq!(parse_line("   \t ").unwrap(), Expr::Empty);
    }

    #[test]
    fn simple_command_with_args() {
        assert_eq!(
            parse_line("echo hello world").unwrap(),
            simple(&["echo", "hello", "world"])
        );
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            parse_line(r#"echo "hello   world" 'a | b'"#).unwrap(),
            simple(&["echo", "hello   world", "a | b"])
        );
    }

    #[test]
    fn pipeline_associates_left() {
        let expr = parse_line("a | b | c").unwrap();
        let Expr::Pipe { left, right } = expr else {
            panic!("expected pipe, got {expr:?}");
        };
        assert_eq!(*right, simple(&["c"]));
        assert_eq!(
            *left,
            Expr::Pipe {
                left: Box::new(simple(&["a"])),
                right: Box::new(simple(&["b"])),
            }
        );
    }

    #[test]
    fn and_or_chain() {
        let expr = parse_line("a && b || c").unwrap();
        let Expr::Sequence { op, left, right } = expr else {
            panic!("expected sequence");
        };
        assert_eq!(op, SeqOp::Or);
        assert_eq!(*right, simple(&["c"]));
        let Expr::Sequence { op, .. } = *left else {
            panic!("expected inner sequence");
        };
        assert_eq!(op, SeqOp::And);
    }

    #[test]
    fn trailing_ampersand_backgrounds() {
        assert_eq!(
            parse_line("sleep 1 &").unwrap(),
            Expr::Background(Box::new(simple(&["sleep", "1"])))
        );
    }

    #[test]
    fn ampersand_also_separates_jobs() {
        let expr = parse_line("sleep 1 & jobs").unwrap();
        let Expr::Sequence { op, left, right } = expr else {
            panic!("expected sequence");
        };
        assert_eq!(op, SeqOp::Always);
        assert_eq!(*left, Expr::Background(Box::new(simple(&["sleep", "1"]))));
        assert_eq!(*right, simple(&["jobs"]));
    }

    #[test]
    fn redirections_wrap_the_command() {
        let expr = parse_line("sort < in > out").unwrap();
        let Expr::Redirect { kind, file, body } = expr else {
            panic!("expected redirect");
        };
        assert_eq!(kind, RedirKind::In);
        assert_eq!(file, "in");
        let Expr::Redirect { kind, file, body } = *body else {
            panic!("expected inner redirect");
        };
        assert_eq!(kind, RedirKind::Out);
        assert_eq!(file, "out");
        assert_eq!(*body, simple(&["sort"]));
    }

    #[test]
    fn stderr_redirections() {
        let expr = parse_line("cmd 2> err").unwrap();
        assert!(matches!(
            expr,
            Expr::Redirect {
                kind: RedirKind::Err,
                ..
            }
        ));

        let expr = parse_line("cmd &> all").unwrap();
        assert!(matches!(
            expr,
            Expr::Redirect {
                kind: RedirKind::ErrOut,
                ..
            }
        ));
    }

    #[test]
    fn append_redirection() {
        let expr = parse_line("echo x >> log").unwrap();
        assert!(matches!(
            expr,
            Expr::Redirect {
                kind: RedirKind::Append,
                ..
            }
        ));
    }

    #[test]
    fn quoted_two_is_not_a_redirection() {
        assert_eq!(
            parse_line(r#"echo "2>" x"#).unwrap(),
            simple(&["echo", "2>", "x"])
        );
    }

    #[test]
    fn group_takes_redirections() {
        let expr = parse_line("(echo a; echo b) > out").unwrap();
        let Expr::Redirect { kind, body, .. } = expr else {
            panic!("expected redirect");
        };
        assert_eq!(kind, RedirKind::Out);
        assert!(matches!(
            *body,
            Expr::Sequence {
                op: SeqOp::Always,
                ..
            }
        ));
    }

    #[test]
    fn background_group() {
        let expr = parse_line("(sleep 1 && echo done) &").unwrap();
        let Expr::Background(body) = expr else {
            panic!("expected background");
        };
        assert!(matches!(*body, Expr::Sequence { op: SeqOp::And, .. }));
    }

    #[test]
    fn missing_filename_is_an_error() {
        assert!(parse_line("echo >").is_err());
        assert!(parse_line("cat <").is_err());
    }

    #[test]
    fn missing_command_is_an_error() {
        assert!(parse_line("| cat").is_err());
        assert!(parse_line("a | ").is_err());
        assert!(parse_line("&& b").is_err());
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(parse_line("echo 'open").is_err());
        assert!(parse_line("echo \"open").is_err());
    }

    #[test]
    fn unbalanced_parens_are_an_error() {
        assert!(parse_line("(echo a").is_err());
        assert!(parse_line("echo a)").is_err());
    }
}
