use logos::Logos;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt;

// ── Interner ─────────────────────────────────────────────────────

/// Interned string handle. Equal handles mean equal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

/// Maps source strings to stable integer handles, one table per
/// compilation job.
#[derive(Debug, Clone, Default)]
pub struct Interner {
    map: HashMap<SmolStr, Name>,
    strings: Vec<SmolStr>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string. Idempotent: the same text always yields the same
    /// handle within one interner.
    pub fn store(&mut self, text: &str) -> Name {
        if let Some(&name) = self.map.get(text) {
            return name;
        }
        let name = Name(self.strings.len() as u32);
        let text = SmolStr::new(text);
        self.strings.push(text.clone());
        self.map.insert(text, name);
        name
    }

    /// Resolve a handle back to the string it was stored from.
    pub fn lookup(&self, name: Name) -> &str {
        &self.strings[name.0 as usize]
    }
}

// ── Source positions ─────────────────────────────────────────────

/// 1-based line/column source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Step over `text`, resetting the column at every newline.
    fn advance(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open source range: `begin` is the position before the lexeme's
/// first byte, `end` the position after its last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub begin: Position,
    pub end: Position,
}

impl Span {
    pub fn new(begin: Position, end: Position) -> Self {
        Self { begin, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

// ── Builtins ─────────────────────────────────────────────────────

/// Handles the parser and checker compare identifiers against: the ground
/// type names (which double as the conversion intrinsics) and the implicit
/// export.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub ty_i32: Name,
    pub ty_i64: Name,
    pub ty_f32: Name,
    pub ty_f64: Name,
    pub ty_bool: Name,
    pub ty_string: Name,
    pub ty_void: Name,
    /// Exported when the embedder declares no exports of its own.
    pub start: Name,
}

impl Builtins {
    pub fn new(interner: &mut Interner) -> Self {
        Self {
            ty_i32: interner.store("i32"),
            ty_i64: interner.store("i64"),
            ty_f32: interner.store("f32"),
            ty_f64: interner.store("f64"),
            ty_bool: interner.store("bool"),
            ty_string: interner.store("string"),
            ty_void: interner.store("void"),
            start: interner.store("start"),
        }
    }

    /// Whether `name` is one of the numeric conversion intrinsics.
    pub fn is_conversion(&self, name: Name) -> bool {
        name == self.ty_i32 || name == self.ty_i64 || name == self.ty_f32 || name == self.ty_f64
    }
}

// ── Tokens ───────────────────────────────────────────────────────

/// One lexeme. Literal and symbol tokens carry the interned handle of
/// their exact source text; string handles include both quotes.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(extras = Interner)]
#[logos(skip r"[ \t]+")]
pub enum Token {
    /// A run of consecutive newlines — the statement separator.
    #[regex(r"\n+")]
    NewLine,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    #[token("=")]
    Equal,
    #[token("==", priority = 5)]
    EqualEqual,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Times,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("%")]
    Percent,
    #[token(">")]
    Greater,
    #[token("<")]
    Less,

    #[token("fn")]
    Fn,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("or")]
    Or,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex(r"-?[0-9]+", |lex| lex.extras.store(lex.slice()), priority = 2)]
    Int(Name),

    /// A digit/dot run with at least one interior dot. More than one dot is
    /// emitted as written (`1.2.3`); a trailing dot is left in the stream,
    /// so `7.` lexes as `7` followed by `.`.
    #[regex(r"-?[0-9]*\.[0-9.]*[0-9]", |lex| lex.extras.store(lex.slice()), priority = 3)]
    Float(Name),

    #[regex(r#""[^"]*""#, |lex| lex.extras.store(lex.slice()))]
    #[regex(r#""[^"]*"#, |lex| lex.extras.store(lex.slice()))]
    Str(Name),

    /// Anything else runs until a reserved byte: space, newline, `(`, `)`,
    /// `.`, `:`, `,`.
    #[regex(r#"[^ \t\n"(){}.:,=+\-*/^%<>0-9][^ \n().:,]*"#, |lex| lex.extras.store(lex.slice()), priority = 1)]
    Symbol(Name),
}

/// Lex a source into position-tagged tokens. Tokenization cannot fail:
/// the pattern set accepts any byte stream. Returns the interner holding
/// every lexeme.
pub fn tokenize(source: &str) -> (Vec<(Token, Span)>, Interner) {
    let mut lexer = Token::lexer_with_extras(source, Interner::new());
    let mut tokens = Vec::new();
    let mut pos = Position::new(1, 1);
    let mut cursor = 0usize;

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        pos.advance(&source[cursor..range.start]);
        let begin = pos;
        pos.advance(&source[range.start..range.end]);
        cursor = range.end;

        let token = match result {
            Ok(token) => token,
            // The patterns cover every byte; any residue is a symbol.
            Err(()) => Token::Symbol(lexer.extras.store(lexer.slice())),
        };
        tokens.push((token, Span::new(begin, pos)));
    }

    (tokens, lexer.extras)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<(Token, Span)>, Interner) {
        tokenize(source)
    }

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).0.into_iter().map(|(t, _)| t).collect()
    }

    /// Interned texts of every literal/symbol token, in order.
    fn texts(source: &str) -> Vec<String> {
        let (tokens, interner) = lex(source);
        tokens
            .into_iter()
            .filter_map(|(t, _)| match t {
                Token::Int(n) | Token::Float(n) | Token::Str(n) | Token::Symbol(n) => {
                    Some(interner.lookup(n).to_owned())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn punctuation() {
        assert_eq!(
            kinds("( ) { } : , ."),
            vec![
                Token::LParen,
                Token::RParen,
                Token::LBrace,
                Token::RBrace,
                Token::Colon,
                Token::Comma,
                Token::Dot,
            ]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("+ - * / ^ % > <"),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Times,
                Token::Slash,
                Token::Caret,
                Token::Percent,
                Token::Greater,
                Token::Less,
            ]
        );
    }

    #[test]
    fn equal_lookahead() {
        assert_eq!(kinds("= =="), vec![Token::Equal, Token::EqualEqual]);
        // two-character lookahead only: `===` is `==` then `=`
        assert_eq!(kinds("==="), vec![Token::EqualEqual, Token::Equal]);
    }

    #[test]
    fn integers() {
        assert!(matches!(kinds("42")[0], Token::Int(_)));
        assert_eq!(texts("42 0 -7"), vec!["42", "0", "-7"]);
    }

    #[test]
    fn floats() {
        assert!(matches!(kinds("3.25")[0], Token::Float(_)));
        assert_eq!(texts("3.25 -0.5 .5"), vec!["3.25", "-0.5", ".5"]);
    }

    #[test]
    fn number_run_with_several_dots_is_one_float() {
        let tokens = kinds("1.2.3");
        assert_eq!(tokens.len(), 1);
        assert!(matches!(tokens[0], Token::Float(_)));
        assert_eq!(texts("1.2.3"), vec!["1.2.3"]);
    }

    #[test]
    fn trailing_dot_returns_to_stream() {
        // member access: the dot after `7` is not part of the number
        let tokens = kinds("7.");
        assert!(matches!(tokens[0], Token::Int(_)));
        assert_eq!(tokens[1], Token::Dot);
        assert_eq!(texts("7."), vec!["7"]);
    }

    #[test]
    fn lone_minus_and_dot() {
        assert_eq!(kinds("-"), vec![Token::Minus]);
        assert_eq!(kinds("."), vec![Token::Dot]);
        assert!(matches!(kinds("- 1")[1], Token::Int(_)));
    }

    #[test]
    fn strings_keep_their_quotes() {
        assert_eq!(texts(r#""hello""#), vec![r#""hello""#]);
        assert_eq!(texts(r#""""#), vec![r#""""#]);
        assert!(matches!(kinds(r#""hello""#)[0], Token::Str(_)));
    }

    #[test]
    fn unterminated_string_runs_to_end() {
        let tokens = kinds(r#""oops"#);
        assert_eq!(tokens.len(), 1);
        assert!(matches!(tokens[0], Token::Str(_)));
        assert_eq!(texts(r#""oops"#), vec![r#""oops"#]);
    }

    #[test]
    fn keywords() {
        assert_eq!(
            kinds("fn if else or true false"),
            vec![
                Token::Fn,
                Token::If,
                Token::Else,
                Token::Or,
                Token::True,
                Token::False,
            ]
        );
    }

    #[test]
    fn keyword_prefixes_are_symbols() {
        assert!(matches!(kinds("fnord")[0], Token::Symbol(_)));
        assert!(matches!(kinds("iffy")[0], Token::Symbol(_)));
        assert_eq!(texts("fnord iffy orchid"), vec!["fnord", "iffy", "orchid"]);
    }

    #[test]
    fn symbols_run_until_reserved_bytes() {
        assert_eq!(texts("spawn_enemy x1"), vec!["spawn_enemy", "x1"]);
        // only space, newline, parens, dot, colon and comma stop a symbol
        assert_eq!(texts("x+y"), vec!["x+y"]);
        assert_eq!(texts("a.b"), vec!["a", "b"]);
        assert_eq!(kinds("a.b")[1], Token::Dot);
    }

    #[test]
    fn newline_runs_collapse_to_one_token() {
        let (tokens, _) = lex("a\n\n\nb");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].0, Token::NewLine);
        let span = tokens[1].1;
        assert_eq!(span.begin, Position::new(1, 2));
        assert_eq!(span.end, Position::new(4, 1));
        // column resets after the newline run
        assert_eq!(tokens[2].1.begin, Position::new(4, 1));
    }

    #[test]
    fn spans_track_line_and_column() {
        let (tokens, _) = lex("( 12 )");
        assert_eq!(tokens[0].1, Span::new(Position::new(1, 1), Position::new(1, 2)));
        assert_eq!(tokens[1].1, Span::new(Position::new(1, 3), Position::new(1, 5)));
        assert_eq!(tokens[2].1, Span::new(Position::new(1, 6), Position::new(1, 7)));
    }

    /// The lexeme a token stands for, reconstructed without the source.
    fn lexeme(token: Token, span: Span, interner: &Interner) -> String {
        match token {
            Token::NewLine => "\n".repeat((span.end.line - span.begin.line) as usize),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LBrace => "{".into(),
            Token::RBrace => "}".into(),
            Token::Colon => ":".into(),
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Equal => "=".into(),
            Token::EqualEqual => "==".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Times => "*".into(),
            Token::Slash => "/".into(),
            Token::Caret => "^".into(),
            Token::Percent => "%".into(),
            Token::Greater => ">".into(),
            Token::Less => "<".into(),
            Token::Fn => "fn".into(),
            Token::If => "if".into(),
            Token::Else => "else".into(),
            Token::Or => "or".into(),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::Int(n) | Token::Float(n) | Token::Str(n) | Token::Symbol(n) => {
                interner.lookup(n).to_owned()
            }
        }
    }

    #[test]
    fn token_lexemes_cover_the_source() {
        let source = "start = fn() i32 {\n    x = 0\n    x += 1\n    x\n}\n";
        let (tokens, interner) = lex(source);
        let rebuilt: String = tokens
            .iter()
            .map(|&(t, s)| lexeme(t, s, &interner))
            .collect();
        let stripped: String = source.chars().filter(|&c| c != ' ' && c != '\t').collect();
        assert_eq!(rebuilt, stripped);
    }

    #[test]
    fn interner_is_deterministic() {
        let mut interner = Interner::new();
        let a = interner.store("alpha");
        let b = interner.store("beta");
        assert_ne!(a, b);
        assert_eq!(interner.store("alpha"), a);
        assert_eq!(interner.lookup(a), "alpha");
        assert_eq!(interner.lookup(b), "beta");
    }

    #[test]
    fn repeated_lexemes_share_a_handle() {
        let (tokens, _) = lex("x x y x");
        let names: Vec<Name> = tokens
            .iter()
            .filter_map(|(t, _)| match t {
                Token::Symbol(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(names[0], names[1]);
        assert_eq!(names[0], names[3]);
        assert_ne!(names[0], names[2]);
    }
}
