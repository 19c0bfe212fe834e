use anyhow::{anyhow, bail, Result};

/// Indices into the per-cell regulatory vector.
pub const FGF4: usize = 0;
pub const FGFR: usize = 1;
pub const ERK: usize = 2;
pub const GATA6: usize = 3;
pub const NANOG: usize = 4;

/// Number of values in the regulatory vector / number of update rules.
pub const NUM_RULES: usize = 5;

/// A compiled regulatory-rule expression over the inputs `x1`..`x5`.
///
/// `x1` is the external FGF4 signal sampled from the diffusion field; `x2`
/// through `x5` are the stored FGFR, ERK, GATA6 and NANOG values. Rules are
/// compiled once at setup so no string evaluation happens during stepping.
#[derive(Debug, Clone)]
enum Expr {
    Const(u32),
    /// 0-based input index (0 = external signal, 1..4 = stored values).
    Var(usize),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, inputs: &[u32; NUM_RULES]) -> u32 {
        match self {
            Expr::Const(c) => *c,
            Expr::Var(i) => inputs[*i],
            Expr::Add(a, b) => a.eval(inputs).wrapping_add(b.eval(inputs)),
            Expr::Mul(a, b) => a.eval(inputs).wrapping_mul(b.eval(inputs)),
        }
    }
}

/// The five-input, five-output regulatory network shared by all cells.
#[derive(Debug, Clone)]
pub struct GeneNetwork {
    rules: Vec<Expr>,
    num_states: u32,
}

impl GeneNetwork {
    /// Compiles the five symbolic rule strings. A malformed or missing rule
    /// is a configuration error; nothing is evaluated lazily afterwards.
    pub fn compile(rule_strings: &[String], num_states: u32) -> Result<Self> {
        if rule_strings.len() != NUM_RULES {
            bail!(
                "regulatory network requires exactly {} rules, got {}",
                NUM_RULES,
                rule_strings.len()
            );
        }
        if num_states < 2 {
            bail!("num_states must be at least 2, got {}", num_states);
        }
        let rules = rule_strings
            .iter()
            .enumerate()
            .map(|(i, s)| {
                parse_expression(s).map_err(|e| anyhow!("rule {} ('{}'): {}", i + 1, s, e))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, num_states })
    }

    /// Evaluates one synchronous network update. `signal` is the external
    /// FGF4 input; `stored` is the cell's current regulatory vector, replaced
    /// in place with the five outputs (each reduced modulo `num_states`).
    /// Returns the new FGF4 output used by the consumption logic.
    pub fn step(&self, signal: u8, stored: &mut [u8; NUM_RULES]) -> u8 {
        let inputs: [u32; NUM_RULES] = [
            signal as u32,
            stored[FGFR] as u32,
            stored[ERK] as u32,
            stored[GATA6] as u32,
            stored[NANOG] as u32,
        ];
        for (slot, rule) in stored.iter_mut().zip(self.rules.iter()) {
            *slot = (rule.eval(&inputs) % self.num_states) as u8;
        }
        stored[FGF4]
    }

    pub fn num_states(&self) -> u32 {
        self.num_states
    }
}

/// Recursive-descent parser for the rule grammar:
///
/// ```text
/// expr   := term { '+' term }
/// term   := factor { '*' factor }
/// factor := NUMBER | 'x'DIGIT | '(' expr ')'
/// ```
fn parse_expression(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut pos = 0;
    let expr = parse_sum(&tokens, &mut pos)?;
    if pos != tokens.len() {
        bail!("unexpected trailing input at token {}", pos);
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(u32),
    Var(usize),
    Plus,
    Star,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            'x' | 'X' => {
                chars.next();
                let digit = chars
                    .next()
                    .and_then(|d| d.to_digit(10))
                    .ok_or_else(|| anyhow!("'x' must be followed by an input number"))?;
                if digit < 1 || digit as usize > NUM_RULES {
                    bail!("input x{} out of range (x1..x{})", digit, NUM_RULES);
                }
                tokens.push(Token::Var(digit as usize - 1));
            }
            '0'..='9' => {
                let mut value = 0u32;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(d))
                        .ok_or_else(|| anyhow!("numeric literal too large"))?;
                    chars.next();
                }
                tokens.push(Token::Number(value));
            }
            other => bail!("unexpected character '{}'", other),
        }
    }
    if tokens.is_empty() {
        bail!("empty rule");
    }
    Ok(tokens)
}

fn parse_sum(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    let mut left = parse_product(tokens, pos)?;
    while tokens.get(*pos) == Some(&Token::Plus) {
        *pos += 1;
        let right = parse_product(tokens, pos)?;
        left = Expr::Add(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_product(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    let mut left = parse_factor(tokens, pos)?;
    while tokens.get(*pos) == Some(&Token::Star) {
        *pos += 1;
        let right = parse_factor(tokens, pos)?;
        left = Expr::Mul(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_factor(tokens: &[Token], pos: &mut usize) -> Result<Expr> {
    match tokens.get(*pos) {
        Some(Token::Number(n)) => {
            *pos += 1;
            Ok(Expr::Const(*n))
        }
        Some(Token::Var(i)) => {
            *pos += 1;
            Ok(Expr::Var(*i))
        }
        Some(Token::Open) => {
            *pos += 1;
            let inner = parse_sum(tokens, pos)?;
            if tokens.get(*pos) != Some(&Token::Close) {
                bail!("missing closing parenthesis");
            }
            *pos += 1;
            Ok(inner)
        }
        Some(t) => bail!("unexpected token {:?}", t),
        None => bail!("unexpected end of rule"),
    }
}
