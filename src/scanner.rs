use anyhow::anyhow;

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum TokenType {
    LeftParen,
    RightParen,
    LeftSquare,
    RightSquare,
    LeftBrace,
    RightBrace,
    Comma,
    Equal,

    Identifier,
    QuotedIdentifier,
    String,
    Number,

    // Operators and anything else the call syntax does not care about
    Other,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenType,
    pub lexeme: String,
    /// Byte offset of the first character of the token in the source.
    pub start: usize,
    /// Byte offset one past the last character of the token in the source.
    pub end: usize,
}

/// Tokenizer for a single line of M source, enough to follow quoting and
/// nesting of a function call and its arguments.
pub struct Scanner {
    source_chars: Vec<(usize, char)>,
    source_len: usize,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            source_chars: source.char_indices().collect(),
            source_len: source.len(),
            tokens: vec![],
            start: 0,
            current: 0,
        }
    }

    pub fn tokens(&self) -> &Vec<Token> {
        &self.tokens
    }

    fn advance(&mut self) -> char {
        let c = self.source_chars[self.current].1;
        self.current += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source_chars[self.current].1
        }
    }

    fn peek_next_i(&self, i: usize) -> char {
        if self.current + i >= self.source_chars.len() {
            '\0'
        } else {
            self.source_chars[self.current + i].1
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected {
            return false;
        };

        self.current += 1;
        true
    }

    fn byte_offset(&self, char_idx: usize) -> usize {
        self.source_chars
            .get(char_idx)
            .map_or(self.source_len, |(offset, _)| *offset)
    }

    fn add_token(&mut self, token_type: TokenType) {
        let start = self.byte_offset(self.start);
        let end = self.byte_offset(self.current);
        self.tokens.push(Token {
            kind: token_type,
            lexeme: self.source_chars[self.start..self.current]
                .iter()
                .map(|(_, c)| c)
                .collect(),
            start,
            end,
        });
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.start = 0;
        self.current = 0;
    }

    pub fn scan(&mut self) -> anyhow::Result<()> {
        self.reset();
        while self.current < self.source_chars.len() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.tokens.push(Token {
            kind: TokenType::Eof,
            lexeme: String::from("eof"),
            start: self.source_len,
            end: self.source_len,
        });

        Ok(())
    }

    /// Scans up to the closing quote. A doubled quote is an escaped quote
    /// and does not terminate the literal.
    fn scan_string(&mut self) -> anyhow::Result<()> {
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error_str("Found unterminated string")));
            }
            if self.match_char('"') {
                if self.match_char('"') {
                    continue;
                }
                break;
            }
            self.advance();
        }
        Ok(())
    }

    fn match_number(&mut self) {
        while self.peek().is_ascii_digit() || (self.peek() == '.' && self.peek_next_i(1).is_ascii_digit()) {
            self.advance();
        }
        self.add_token(TokenType::Number);
    }

    fn match_identifier(&mut self) {
        loop {
            let peek_char = self.peek();
            // Dotted names such as `Sql.Database` form a single identifier.
            if peek_char.is_alphanumeric()
                || peek_char == '_'
                || (peek_char == '.' && self.peek_next_i(1).is_alphabetic())
            {
                self.advance();
            } else {
                break;
            }
        }
        self.add_token(TokenType::Identifier);
    }

    fn scan_token(&mut self) -> anyhow::Result<()> {
        let curr_char = self.advance();
        match curr_char {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '[' => self.add_token(TokenType::LeftSquare),
            ']' => self.add_token(TokenType::RightSquare),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '=' => {
                if self.match_char('>') {
                    self.add_token(TokenType::Other);
                } else {
                    self.add_token(TokenType::Equal);
                }
            }
            '/' => {
                if self.match_char('/') {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    loop {
                        if self.is_at_end() {
                            return Err(anyhow!(self.error_str("Found unterminated comment")));
                        }
                        if self.peek() == '*' && self.peek_next_i(1) == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Other);
                }
            }
            '"' => {
                self.scan_string()?;
                self.add_token(TokenType::String);
            }
            '#' => {
                if self.match_char('"') {
                    self.scan_string()?;
                    self.add_token(TokenType::QuotedIdentifier);
                } else if self.peek().is_alphabetic() {
                    self.match_identifier();
                } else {
                    self.add_token(TokenType::Other);
                }
            }
            '\r' | '\n' | ' ' | '\t' => {}
            c if c.is_ascii_digit() => self.match_number(),
            c if c.is_alphabetic() || c == '_' => self.match_identifier(),
            _ => self.add_token(TokenType::Other),
        }
        Ok(())
    }

    fn error_str(&self, error: &str) -> String {
        format!(
            "[offset: {}] Scanner error: {}",
            self.byte_offset(self.start),
            error
        )
    }
}
