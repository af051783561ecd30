//! Arithmetic parser for cell formulas.
//!
//! Formulas are parsed into a small AST by a recursive descent parser instead
//! of being handed to a general-purpose code evaluator. Only arithmetic over
//! numbers and cell references is accepted.
//!
//! # BNF Grammar
//!
//! ```bnf
//! Expression ::= Term ( ( "+" | "-" ) Term )*
//! Term       ::= Unary ( ( "*" | "/" ) Unary )*
//! Unary      ::= ( "+" | "-" ) Unary | Primary
//! Primary    ::= Number | CellRef | "(" Expression ")"
//! CellRef    ::= [A-Z]+ [0-9]+
//! Number     ::= [0-9]+ ( "." [0-9]* )? | "." [0-9]+
//! ```
//!
//! Multiplicative operators bind tighter than additive ones, both are
//! left-associative, and unary signs bind tighter than either.
//!
//! Parenthesis and sign nesting, and the height of the resulting tree, are
//! capped at [`MAX_NESTING_DEPTH`].

use super::errors::{CellError, CellResult};

/// Deepest nesting a formula may use, counted both as open parentheses and
/// signs during parsing and as the height of the finished tree.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Represents a token in the expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    CellRef(String),
    /// Any other word. Never valid in a formula; kept for error messages.
    Identifier(String),

    Plus,
    Minus,
    Multiply,
    Divide,

    LeftParen,
    RightParen,

    Eof,
}

/// Abstract syntax tree of a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    CellRef(String),
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl Expr {
    /// Cell references in source order, duplicates included.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    /// Height of the tree; a lone number or reference has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Expr::Number(_) | Expr::CellRef(_) => 1,
            Expr::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
            Expr::Unary { operand, .. } => 1 + operand.depth(),
        }
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::CellRef(cell_ref) => refs.push(cell_ref),
            Expr::Binary { left, right, .. } => {
                left.collect_references(refs);
                right.collect_references(refs);
            }
            Expr::Unary { operand, .. } => operand.collect_references(refs),
        }
    }
}

/// Lexical analyzer for tokenizing expressions.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_digits(&mut self, out: &mut String) {
        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                out.push(ch);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Reads an integer or decimal literal; `1.` and `.5` are both accepted.
    fn read_number(&mut self) -> CellResult<f64> {
        let mut number_str = String::new();
        self.read_digits(&mut number_str);

        if self.current_char == Some('.') {
            number_str.push('.');
            self.advance();
            self.read_digits(&mut number_str);
        }

        if number_str == "." {
            return Err(CellError::Parse("Expected digits around '.'".to_string()));
        }

        number_str
            .parse::<f64>()
            .map_err(|_| CellError::Parse(format!("Invalid number: {}", number_str)))
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        word
    }

    /// Uppercase letters followed by digits form a cell reference; anything
    /// else is an identifier. References are case-sensitive.
    fn classify_word(word: &str) -> Token {
        let letters = word.bytes().take_while(u8::is_ascii_uppercase).count();
        let rest = &word[letters..];

        if letters > 0 && !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            Token::CellRef(word.to_string())
        } else {
            Token::Identifier(word.to_string())
        }
    }

    pub fn next_token(&mut self) -> CellResult<Token> {
        self.skip_whitespace();

        let Some(ch) = self.current_char else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '0'..='9' | '.' => return self.read_number().map(Token::Number),
            'A'..='Z' | 'a'..='z' | '_' => {
                let word = self.read_word();
                return Ok(Self::classify_word(&word));
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Multiply,
            '/' => Token::Divide,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            _ => return Err(CellError::Parse(format!("Unexpected character: '{}'", ch))),
        };

        self.advance();
        Ok(token)
    }
}

/// Recursive descent parser for formula expressions.
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    nesting: usize,
}

impl Parser {
    pub fn new(input: &str) -> CellResult<Self> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
            nesting: 0,
        })
    }

    fn enter(&mut self) -> CellResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING_DEPTH {
            return Err(too_deep());
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn advance(&mut self) -> CellResult<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> CellResult<()> {
        if self.current_token == expected {
            self.advance()
        } else {
            Err(CellError::Parse(format!(
                "Expected {:?}, found {:?}",
                expected, self.current_token
            )))
        }
    }

    /// Parses the whole input; trailing tokens are an error.
    pub fn parse(&mut self) -> CellResult<Expr> {
        let expr = self.parse_expression()?;

        if self.current_token != Token::Eof {
            return Err(CellError::Parse(format!(
                "Unexpected token at end: {:?}",
                self.current_token
            )));
        }

        Ok(expr)
    }

    fn parse_expression(&mut self) -> CellResult<Expr> {
        let mut left = self.parse_term()?;

        while matches!(self.current_token, Token::Plus | Token::Minus) {
            let operator = if self.current_token == Token::Plus {
                BinaryOp::Add
            } else {
                BinaryOp::Subtract
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = bounded(Expr::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            })?;
        }

        Ok(left)
    }

    fn parse_term(&mut self) -> CellResult<Expr> {
        let mut left = self.parse_unary()?;

        while matches!(self.current_token, Token::Multiply | Token::Divide) {
            let operator = if self.current_token == Token::Multiply {
                BinaryOp::Multiply
            } else {
                BinaryOp::Divide
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = bounded(Expr::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            })?;
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> CellResult<Expr> {
        let operator = match self.current_token {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            _ => return self.parse_primary(),
        };

        self.enter()?;
        self.advance()?;
        let operand = self.parse_unary()?;
        self.leave();
        bounded(Expr::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> CellResult<Expr> {
        match &self.current_token {
            Token::Number(value) => {
                let value = *value;
                self.advance()?;
                Ok(Expr::Number(value))
            }
            Token::CellRef(cell) => {
                let cell = cell.clone();
                self.advance()?;
                Ok(Expr::CellRef(cell))
            }
            Token::LeftParen => {
                self.enter()?;
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                self.leave();
                Ok(expr)
            }
            Token::Identifier(name) => Err(CellError::Parse(format!("Unknown identifier: {}", name))),
            other => Err(CellError::Parse(format!("Unexpected token: {:?}", other))),
        }
    }
}

fn too_deep() -> CellError {
    CellError::Parse(format!("Formula nested deeper than {MAX_NESTING_DEPTH} levels"))
}

fn bounded(expr: Expr) -> CellResult<Expr> {
    if expr.depth() > MAX_NESTING_DEPTH {
        return Err(too_deep());
    }
    Ok(expr)
}

/// Reads `text` as a single signed decimal literal, the same shape a formula
/// accepts for a number. Words such as `inf` or `NaN` and any trailing
/// content give `None`.
pub fn parse_number_literal(text: &str) -> Option<f64> {
    let mut lexer = Lexer::new(text);
    let mut tokens = std::iter::from_fn(|| lexer.next_token().ok());

    let (sign, token) = match tokens.next()? {
        Token::Minus => (-1.0, tokens.next()?),
        Token::Plus => (1.0, tokens.next()?),
        token => (1.0, token),
    };
    match (token, tokens.next()?) {
        (Token::Number(value), Token::Eof) => Some(sign * value),
        _ => None,
    }
}

/// Supplies numeric values for cell references during evaluation.
pub trait ReferenceResolver {
    fn resolve(&self, reference: &str) -> CellResult<f64>;
}

/// Walks an AST and computes its numeric value.
///
/// Non-finite intermediate results are allowed; callers decide whether the
/// final value is acceptable.
pub struct ExpressionEvaluator<'a, R: ReferenceResolver> {
    resolver: &'a R,
}

impl<'a, R: ReferenceResolver> ExpressionEvaluator<'a, R> {
    pub fn new(resolver: &'a R) -> Self {
        Self { resolver }
    }

    pub fn evaluate(&self, expr: &Expr) -> CellResult<f64> {
        match expr {
            Expr::Number(value) => Ok(*value),
            Expr::CellRef(cell_ref) => self.resolver.resolve(cell_ref),
            Expr::Binary { left, operator, right } => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;

                Ok(match operator {
                    BinaryOp::Add => left_val + right_val,
                    BinaryOp::Subtract => left_val - right_val,
                    BinaryOp::Multiply => left_val * right_val,
                    BinaryOp::Divide => left_val / right_val,
                })
            }
            Expr::Unary { operator, operand } => {
                let operand_val = self.evaluate(operand)?;
                Ok(match operator {
                    UnaryOp::Plus => operand_val,
                    UnaryOp::Minus => -operand_val,
                })
            }
        }
    }
}
