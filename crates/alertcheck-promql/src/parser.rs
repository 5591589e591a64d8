use crate::ast::{
    Aggregate, Binary, BinaryModifier, BinaryOp, Call, Expr, GroupSide, Grouping, LabelMatcher,
    MatchOp, Offset, Rollup, UnaryOp, VectorMatching, VectorSelector,
};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::ParseError;
use alertcheck_common::duration::PromDuration;

/// Aggregation operators accepted with `by` / `without` grouping.
const AGGREGATIONS: &[&str] = &[
    "any",
    "avg",
    "bottomk",
    "bottomk_avg",
    "bottomk_last",
    "bottomk_max",
    "bottomk_median",
    "bottomk_min",
    "count",
    "count_values",
    "distinct",
    "geomean",
    "group",
    "histogram",
    "limit_ratio",
    "limitk",
    "mad",
    "max",
    "median",
    "min",
    "mode",
    "outliers_iqr",
    "outliers_mad",
    "outliersk",
    "quantile",
    "quantiles",
    "share",
    "stddev",
    "stdvar",
    "sum",
    "sum2",
    "topk",
    "topk_avg",
    "topk_last",
    "topk_max",
    "topk_median",
    "topk_min",
    "zscore",
];

/// Deepest nesting of parentheses, calls, unary signs and right operands.
const MAX_DEPTH: usize = 128;

/// Parses a PromQL / MetricsQL expression.
///
/// # Examples
///
/// ```
/// let expr = alertcheck_promql::parse(r#"rate(http_requests_total{code="500"}[5m]) > 0"#).unwrap();
/// let selectors: Vec<String> = expr.selectors().into_iter().collect();
/// assert_eq!(selectors, vec![r#"http_requests_total{code="500"}"#]);
/// ```
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expr(0)?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {} after expression", describe(other)))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Every nested sub-expression passes through here, so the depth check
    /// bounds the recursion of the whole parser.
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!(
                "expression is nested more than {MAX_DEPTH} levels deep"
            )));
        }
        self.depth += 1;
        let result = self.parse_binary(min_precedence);
        self.depth -= 1;
        result
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some(op) = self.peek_binary_op() {
            if op.precedence() < min_precedence {
                break;
            }
            self.advance();
            let modifier = self.parse_binary_modifier(op)?;
            let next_min = if op.is_right_associative() {
                op.precedence()
            } else {
                op.precedence() + 1
            };
            let rhs = self.parse_expr(next_min)?;
            lhs = Expr::Binary(Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                modifier,
            });
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            TokenKind::Sub => UnaryOp::Minus,
            TokenKind::Add => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.advance();
        // `-2 ^ 2` is `-(2 ^ 2)`: only `^` binds tighter than a unary sign.
        let operand = self.parse_expr(BinaryOp::Pow.precedence())?;
        Ok(match (op, operand) {
            (UnaryOp::Minus, Expr::Number(n)) => Expr::Number(-n),
            (UnaryOp::Plus, Expr::Number(n)) => Expr::Number(n),
            (op, operand) => Expr::Unary(op, Box::new(operand)),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::LBracket => expr = self.parse_range(expr)?,
                TokenKind::Ident(word) if word.eq_ignore_ascii_case("offset") => {
                    self.advance();
                    let offset = self.parse_offset()?;
                    expr = with_rollup(expr, |r| r.offset.is_none(), |r| r.offset = Some(offset));
                }
                TokenKind::At => {
                    self.advance();
                    let at = self.parse_at()?;
                    expr = with_rollup(expr, |r| r.at.is_none(), |r| r.at = Some(Box::new(at)));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::Duration(raw) => {
                // MetricsQL lets a duration stand for its length in seconds.
                let duration = self.duration_value(&raw)?;
                self.advance();
                Ok(Expr::Number(duration.as_millis() as f64 / 1000.0))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::LBrace => Ok(Expr::Selector(self.parse_selector(None)?)),
            TokenKind::Ident(name) => {
                self.advance();
                self.parse_identifier(name)
            }
            other => Err(self.error(format!("unexpected {}", describe(&other)))),
        }
    }

    fn parse_identifier(&mut self, name: String) -> Result<Expr, ParseError> {
        let lower = name.to_ascii_lowercase();
        let is_aggregation = AGGREGATIONS.contains(&lower.as_str());

        if is_aggregation && self.peek_grouping_keyword() {
            let grouping = self.parse_grouping()?;
            let args = self.parse_args()?;
            let limit = self.parse_limit()?;
            return Ok(Expr::Aggregate(Aggregate {
                op: name,
                args,
                grouping: Some(grouping),
                limit,
            }));
        }

        match self.peek() {
            TokenKind::LParen => {
                let args = self.parse_args()?;
                if is_aggregation {
                    let grouping = if self.peek_grouping_keyword() {
                        Some(self.parse_grouping()?)
                    } else {
                        None
                    };
                    let limit = self.parse_limit()?;
                    return Ok(Expr::Aggregate(Aggregate {
                        op: name,
                        args,
                        grouping,
                        limit,
                    }));
                }
                let keep_metric_names = self.consume_keyword("keep_metric_names");
                Ok(Expr::Call(Call {
                    name,
                    args,
                    keep_metric_names,
                }))
            }
            TokenKind::LBrace => Ok(Expr::Selector(self.parse_selector(Some(name))?)),
            _ if lower == "inf" => Ok(Expr::Number(f64::INFINITY)),
            _ if lower == "nan" => Ok(Expr::Number(f64::NAN)),
            _ => Ok(Expr::Selector(VectorSelector {
                name: Some(name),
                groups: vec![Vec::new()],
            })),
        }
    }

    fn parse_selector(&mut self, mut name: Option<String>) -> Result<VectorSelector, ParseError> {
        let open_offset = self.offset();
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut groups: Vec<Vec<LabelMatcher>> = vec![Vec::new()];

        if !self.consume(&TokenKind::RBrace) {
            loop {
                self.parse_matcher(&mut name, &mut groups)?;
                match self.peek() {
                    TokenKind::Comma => {
                        self.advance();
                        if self.consume(&TokenKind::RBrace) {
                            break;
                        }
                    }
                    TokenKind::Ident(word) if word.eq_ignore_ascii_case("or") => {
                        self.advance();
                        groups.push(Vec::new());
                    }
                    TokenKind::RBrace => {
                        self.advance();
                        break;
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected ',' or '}}' in label matchers, found {}",
                            describe(other)
                        )))
                    }
                }
            }
        }

        if groups.len() == 1 && name.is_none() {
            if let Some(idx) = groups[0]
                .iter()
                .position(|m| m.name == "__name__" && m.op == MatchOp::Equal)
            {
                name = Some(groups[0].remove(idx).value);
            }
        }

        if name.is_none() && groups.iter().all(|g| g.is_empty()) {
            return Err(ParseError::new(
                "vector selector must contain a metric name or at least one matcher",
                open_offset,
            ));
        }

        Ok(VectorSelector { name, groups })
    }

    fn parse_matcher(
        &mut self,
        name: &mut Option<String>,
        groups: &mut [Vec<LabelMatcher>],
    ) -> Result<(), ParseError> {
        let start = self.offset();
        let label = match self.peek().clone() {
            TokenKind::Ident(label) => {
                self.advance();
                label
            }
            TokenKind::Str(text) => {
                self.advance();
                if self.peek_match_op().is_none() {
                    // `{"metric_name", job="x"}`
                    if name.is_some() {
                        return Err(ParseError::new("metric name given twice", start));
                    }
                    *name = Some(text);
                    return Ok(());
                }
                text
            }
            other => {
                return Err(self.error(format!(
                    "expected label name, found {}",
                    describe(&other)
                )))
            }
        };

        let op = self
            .peek_match_op()
            .ok_or_else(|| self.error(format!("expected match operator after '{label}'")))?;
        self.advance();

        let value = match self.peek().clone() {
            TokenKind::Str(value) => {
                self.advance();
                value
            }
            other => {
                return Err(self.error(format!(
                    "expected quoted label value, found {}",
                    describe(&other)
                )))
            }
        };

        if let Some(group) = groups.last_mut() {
            group.push(LabelMatcher {
                name: label,
                op,
                value,
            });
        }
        Ok(())
    }

    fn parse_range(&mut self, expr: Expr) -> Result<Expr, ParseError> {
        let open_offset = self.offset();
        self.expect(TokenKind::LBracket, "'['")?;

        let range = self.parse_optional_duration()?;
        let subquery_step = if self.consume(&TokenKind::Colon) {
            Some(self.parse_optional_duration()?)
        } else {
            None
        };
        self.expect(TokenKind::RBracket, "']'")?;

        match range {
            Some(range) if range.is_zero() => {
                return Err(ParseError::new("range must be greater than zero", open_offset))
            }
            None if subquery_step.is_none() => {
                return Err(ParseError::new("missing range duration", open_offset))
            }
            _ => {}
        }

        Ok(with_rollup(
            expr,
            |r| r.range.is_none() && r.subquery_step.is_none() && r.offset.is_none(),
            |r| {
                r.range = range;
                r.subquery_step = subquery_step;
            },
        ))
    }

    fn parse_optional_duration(&mut self) -> Result<Option<PromDuration>, ParseError> {
        match self.peek().clone() {
            TokenKind::Duration(raw) => {
                let duration = self.duration_value(&raw)?;
                self.advance();
                Ok(Some(duration))
            }
            TokenKind::Number(secs) if secs >= 0.0 && secs.fract() == 0.0 => {
                self.advance();
                Ok(Some(PromDuration::from_secs(secs as u64)))
            }
            _ => Ok(None),
        }
    }

    fn parse_offset(&mut self) -> Result<Offset, ParseError> {
        let negative = self.consume(&TokenKind::Sub);
        match self.parse_optional_duration()? {
            Some(duration) => Ok(Offset { negative, duration }),
            None => Err(self.error("expected duration after 'offset'")),
        }
    }

    fn parse_at(&mut self) -> Result<Expr, ParseError> {
        let negative = self.consume(&TokenKind::Sub);
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(if negative { -n } else { n }))
            }
            TokenKind::Ident(word)
                if !negative && (word == "start" || word == "end") =>
            {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Call(Call {
                    name: word,
                    args: Vec::new(),
                    keep_metric_names: false,
                }))
            }
            other => Err(self.error(format!(
                "expected timestamp, start() or end() after '@', found {}",
                describe(&other)
            ))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.consume(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr(0)?);
            match self.peek() {
                TokenKind::Comma => {
                    self.advance();
                    if self.consume(&TokenKind::RParen) {
                        return Ok(args);
                    }
                }
                TokenKind::RParen => {
                    self.advance();
                    return Ok(args);
                }
                other => {
                    return Err(self.error(format!(
                        "expected ',' or ')' in argument list, found {}",
                        describe(other)
                    )))
                }
            }
        }
    }

    fn peek_grouping_keyword(&self) -> bool {
        matches!(self.peek(), TokenKind::Ident(word)
            if word.eq_ignore_ascii_case("by") || word.eq_ignore_ascii_case("without"))
    }

    fn parse_grouping(&mut self) -> Result<Grouping, ParseError> {
        let keyword = match self.peek() {
            TokenKind::Ident(word) => word.to_ascii_lowercase(),
            other => return Err(self.error(format!("expected 'by' or 'without', found {}", describe(other)))),
        };
        self.advance();
        let labels = self.parse_label_list()?;
        Ok(if keyword == "by" {
            Grouping::By(labels)
        } else {
            Grouping::Without(labels)
        })
    }

    fn parse_limit(&mut self) -> Result<Option<u64>, ParseError> {
        if !self.consume_keyword("limit") {
            return Ok(None);
        }
        match self.peek().clone() {
            TokenKind::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                self.advance();
                Ok(Some(n as u64))
            }
            other => Err(self.error(format!(
                "expected integer after 'limit', found {}",
                describe(&other)
            ))),
        }
    }

    fn parse_label_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut labels = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::RParen => {
                    self.advance();
                    return Ok(labels);
                }
                TokenKind::Ident(label) | TokenKind::Str(label) => {
                    self.advance();
                    labels.push(label);
                    match self.peek() {
                        TokenKind::Comma => self.advance(),
                        TokenKind::RParen => {}
                        other => {
                            return Err(self.error(format!(
                                "expected ',' or ')' in label list, found {}",
                                describe(other)
                            )))
                        }
                    }
                }
                other => {
                    return Err(self.error(format!(
                        "expected label name, found {}",
                        describe(&other)
                    )))
                }
            }
        }
    }

    fn parse_binary_modifier(&mut self, op: BinaryOp) -> Result<BinaryModifier, ParseError> {
        let mut modifier = BinaryModifier::default();

        if self.consume_keyword("bool") {
            if !op.is_comparison() {
                return Err(self.error("'bool' modifier is only allowed on comparison operators"));
            }
            modifier.return_bool = true;
        }

        if self.consume_keyword("on") {
            modifier.matching = Some(VectorMatching::On(self.parse_label_list()?));
        } else if self.consume_keyword("ignoring") {
            modifier.matching = Some(VectorMatching::Ignoring(self.parse_label_list()?));
        }

        let left = self.consume_keyword("group_left");
        let right = !left && self.consume_keyword("group_right");
        if left || right {
            if op.is_set_operator() {
                return Err(self.error(format!("no grouping allowed for '{op}' operation")));
            }
            let labels = if matches!(self.peek(), TokenKind::LParen) {
                self.parse_label_list()?
            } else {
                Vec::new()
            };
            modifier.group = Some(if left {
                GroupSide::Left(labels)
            } else {
                GroupSide::Right(labels)
            });
        }

        Ok(modifier)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        let op = match self.peek() {
            TokenKind::Add => BinaryOp::Add,
            TokenKind::Sub => BinaryOp::Sub,
            TokenKind::Mul => BinaryOp::Mul,
            TokenKind::Div => BinaryOp::Div,
            TokenKind::Mod => BinaryOp::Mod,
            TokenKind::Pow => BinaryOp::Pow,
            TokenKind::Eql => BinaryOp::Eql,
            TokenKind::Neq => BinaryOp::Neq,
            TokenKind::Lss => BinaryOp::Lss,
            TokenKind::Gtr => BinaryOp::Gtr,
            TokenKind::Lte => BinaryOp::Lte,
            TokenKind::Gte => BinaryOp::Gte,
            TokenKind::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "and" => BinaryOp::And,
                "or" => BinaryOp::Or,
                "unless" => BinaryOp::Unless,
                "atan2" => BinaryOp::Atan2,
                "default" => BinaryOp::Default,
                "if" => BinaryOp::If,
                "ifnot" => BinaryOp::IfNot,
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }

    fn peek_match_op(&self) -> Option<MatchOp> {
        match self.peek() {
            TokenKind::Assign => Some(MatchOp::Equal),
            TokenKind::Neq => Some(MatchOp::NotEqual),
            TokenKind::RegexMatch => Some(MatchOp::RegexMatch),
            TokenKind::RegexNoMatch => Some(MatchOp::RegexNoMatch),
            _ => None,
        }
    }

    fn duration_value(&self, raw: &str) -> Result<PromDuration, ParseError> {
        PromDuration::parse(raw).map_err(|e| self.error(e.to_string()))
    }

    fn peek(&self) -> &TokenKind {
        // The token list always ends with `Eof`, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            TokenKind::Ident(word) if word.eq_ignore_ascii_case(keyword) => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ParseError> {
        if self.consume(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {}", describe(self.peek()))))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.offset())
    }
}

/// Applies `apply` to `expr` if it is a rollup accepting the modifier,
/// otherwise wraps `expr` in a fresh rollup first.
fn with_rollup(
    expr: Expr,
    accepts: impl Fn(&Rollup) -> bool,
    apply: impl FnOnce(&mut Rollup),
) -> Expr {
    let mut rollup = match expr {
        Expr::Rollup(rollup) if accepts(&rollup) => rollup,
        other => Rollup {
            expr: Box::new(other),
            range: None,
            subquery_step: None,
            offset: None,
            at: None,
        },
    };
    apply(&mut rollup);
    Expr::Rollup(rollup)
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(word) => format!("identifier '{word}'"),
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Duration(d) => format!("duration {d}"),
        TokenKind::Str(s) => format!("string \"{s}\""),
        TokenKind::Eof => "end of input".to_string(),
        other => format!("'{}'", symbol(other)),
    }
}

fn symbol(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Comma => ",",
        TokenKind::Colon => ":",
        TokenKind::At => "@",
        TokenKind::Add => "+",
        TokenKind::Sub => "-",
        TokenKind::Mul => "*",
        TokenKind::Div => "/",
        TokenKind::Mod => "%",
        TokenKind::Pow => "^",
        TokenKind::Assign => "=",
        TokenKind::Eql => "==",
        TokenKind::Neq => "!=",
        TokenKind::Lss => "<",
        TokenKind::Gtr => ">",
        TokenKind::Lte => "<=",
        TokenKind::Gte => ">=",
        TokenKind::RegexMatch => "=~",
        TokenKind::RegexNoMatch => "!~",
        TokenKind::Ident(_)
        | TokenKind::Number(_)
        | TokenKind::Duration(_)
        | TokenKind::Str(_)
        | TokenKind::Eof => "?",
    }
}
