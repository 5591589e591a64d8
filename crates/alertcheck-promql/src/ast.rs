use crate::lexer::{is_ident_continue, is_ident_start};
use alertcheck_common::duration::PromDuration;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    NotEqual,
    RegexMatch,
    RegexNoMatch,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchOp::Equal => "=",
            MatchOp::NotEqual => "!=",
            MatchOp::RegexMatch => "=~",
            MatchOp::RegexNoMatch => "!~",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_identifier(&self.name) {
            f.write_str(&self.name)?;
        } else {
            f.write_str(&quote(&self.name))?;
        }
        write!(f, "{}{}", self.op, quote(&self.value))
    }
}

/// A metric selector such as `http_requests_total{job="api", code=~"5.."}`.
///
/// `groups` holds the matcher lists joined with `or` (MetricsQL); plain
/// PromQL selectors have exactly one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSelector {
    pub name: Option<String>,
    pub groups: Vec<Vec<LabelMatcher>>,
}

impl fmt::Display for VectorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Names the lexer would not read back as one identifier go inside
        // the braces as a quoted string: `{"my metric"}`.
        let quoted_name = self.name.as_deref().filter(|name| !is_metric_name(name));
        if let (Some(name), None) = (&self.name, quoted_name) {
            f.write_str(name)?;
        }
        let has_matchers = self.groups.iter().any(|g| !g.is_empty());
        if !has_matchers && quoted_name.is_none() {
            if self.name.is_none() {
                f.write_str("{}")?;
            }
            return Ok(());
        }
        f.write_str("{")?;
        if let Some(name) = quoted_name {
            f.write_str(&quote(name))?;
            if has_matchers {
                f.write_str(", ")?;
            }
        }
        if has_matchers {
            for (i, group) in self.groups.iter().enumerate() {
                if i > 0 {
                    f.write_str(" or ")?;
                }
                for (j, matcher) in group.iter().enumerate() {
                    if j > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{matcher}")?;
                }
            }
        }
        f.write_str("}")
    }
}

/// True when `name` lexes as a single identifier token.
fn is_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(is_ident_start) && bytes.all(is_ident_continue)
}

/// Bare metric names also must not read as the `Inf` / `NaN` literals.
fn is_metric_name(name: &str) -> bool {
    is_identifier(name) && !name.eq_ignore_ascii_case("inf") && !name.eq_ignore_ascii_case("nan")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub negative: bool,
    pub duration: PromDuration,
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(f, "{}", self.duration)
    }
}

/// Range, subquery, `offset` and `@` modifiers applied to an inner expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    pub expr: Box<Expr>,
    pub range: Option<PromDuration>,
    /// `Some` for subqueries; the inner value is the optional step.
    pub subquery_step: Option<Option<PromDuration>>,
    pub offset: Option<Offset>,
    pub at: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    pub keep_metric_names: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    By(Vec<String>),
    Without(Vec<String>),
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (keyword, labels) = match self {
            Grouping::By(labels) => ("by", labels),
            Grouping::Without(labels) => ("without", labels),
        };
        write!(f, "{keyword} ({})", labels.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub op: String,
    pub args: Vec<Expr>,
    pub grouping: Option<Grouping>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Default,
    If,
    IfNot,
    Or,
    And,
    Unless,
    Eql,
    Neq,
    Lss,
    Gtr,
    Lte,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Atan2,
    Pow,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Default => 1,
            BinaryOp::If | BinaryOp::IfNot => 2,
            BinaryOp::Or => 3,
            BinaryOp::And | BinaryOp::Unless => 4,
            BinaryOp::Eql
            | BinaryOp::Neq
            | BinaryOp::Lss
            | BinaryOp::Gtr
            | BinaryOp::Lte
            | BinaryOp::Gte => 5,
            BinaryOp::Add | BinaryOp::Sub => 6,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Atan2 => 7,
            BinaryOp::Pow => 8,
        }
    }

    pub fn is_right_associative(self) -> bool {
        self == BinaryOp::Pow
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eql
                | BinaryOp::Neq
                | BinaryOp::Lss
                | BinaryOp::Gtr
                | BinaryOp::Lte
                | BinaryOp::Gte
        )
    }

    pub fn is_set_operator(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Unless)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Default => "default",
            BinaryOp::If => "if",
            BinaryOp::IfNot => "ifnot",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Unless => "unless",
            BinaryOp::Eql => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lss => "<",
            BinaryOp::Gtr => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::Pow => "^",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorMatching {
    On(Vec<String>),
    Ignoring(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSide {
    Left(Vec<String>),
    Right(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryModifier {
    pub return_bool: bool,
    pub matching: Option<VectorMatching>,
    pub group: Option<GroupSide>,
}

impl fmt::Display for BinaryModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.return_bool {
            f.write_str(" bool")?;
        }
        match &self.matching {
            Some(VectorMatching::On(labels)) => write!(f, " on ({})", labels.join(", "))?,
            Some(VectorMatching::Ignoring(labels)) => {
                write!(f, " ignoring ({})", labels.join(", "))?
            }
            None => {}
        }
        match &self.group {
            Some(GroupSide::Left(labels)) => write!(f, " group_left ({})", labels.join(", "))?,
            Some(GroupSide::Right(labels)) => write!(f, " group_right ({})", labels.join(", "))?,
            None => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinaryOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    pub modifier: BinaryModifier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Selector(VectorSelector),
    Rollup(Rollup),
    Call(Call),
    Aggregate(Aggregate),
    Unary(UnaryOp, Box<Expr>),
    Binary(Binary),
    Paren(Box<Expr>),
}

impl Expr {
    /// Visits this node and every descendant, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Number(_) | Expr::String(_) | Expr::Selector(_) => {}
            Expr::Rollup(rollup) => {
                rollup.expr.walk(visit);
                if let Some(at) = &rollup.at {
                    at.walk(visit);
                }
            }
            Expr::Call(call) => call.args.iter().for_each(|arg| arg.walk(visit)),
            Expr::Aggregate(agg) => agg.args.iter().for_each(|arg| arg.walk(visit)),
            Expr::Unary(_, inner) | Expr::Paren(inner) => inner.walk(visit),
            Expr::Binary(binary) => {
                binary.lhs.walk(visit);
                binary.rhs.walk(visit);
            }
        }
    }

    /// Canonical text of every distinct metric selector in the tree.
    ///
    /// Each call builds a fresh set, so extractions never share state.
    pub fn selectors(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        self.walk(&mut |expr: &Expr| {
            if let Expr::Selector(selector) = expr {
                found.insert(selector.to_string());
            }
        });
        found
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write_number(f, *n),
            Expr::String(s) => f.write_str(&quote(s)),
            Expr::Selector(selector) => write!(f, "{selector}"),
            Expr::Rollup(rollup) => {
                write!(f, "{}", rollup.expr)?;
                if rollup.range.is_some() || rollup.subquery_step.is_some() {
                    f.write_str("[")?;
                    if let Some(range) = rollup.range {
                        write!(f, "{range}")?;
                    }
                    if let Some(step) = &rollup.subquery_step {
                        f.write_str(":")?;
                        if let Some(step) = step {
                            write!(f, "{step}")?;
                        }
                    }
                    f.write_str("]")?;
                }
                if let Some(offset) = &rollup.offset {
                    write!(f, " offset {offset}")?;
                }
                if let Some(at) = &rollup.at {
                    write!(f, " @ {at}")?;
                }
                Ok(())
            }
            Expr::Call(call) => {
                write!(f, "{}(", call.name)?;
                write_args(f, &call.args)?;
                f.write_str(")")?;
                if call.keep_metric_names {
                    f.write_str(" keep_metric_names")?;
                }
                Ok(())
            }
            Expr::Aggregate(agg) => {
                write!(f, "{}(", agg.op)?;
                write_args(f, &agg.args)?;
                f.write_str(")")?;
                if let Some(grouping) = &agg.grouping {
                    write!(f, " {grouping}")?;
                }
                if let Some(limit) = agg.limit {
                    write!(f, " limit {limit}")?;
                }
                Ok(())
            }
            Expr::Unary(op, inner) => {
                let sign = match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Minus => "-",
                };
                write!(f, "{sign}{inner}")
            }
            Expr::Binary(binary) => write!(
                f,
                "{} {}{} {}",
                binary.lhs, binary.op, binary.modifier, binary.rhs
            ),
            Expr::Paren(inner) => write!(f, "({inner})"),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "+Inf" } else { "-Inf" })
    } else {
        write!(f, "{n}")
    }
}

/// Double-quotes `value`, escaping what the lexer would otherwise misread.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
