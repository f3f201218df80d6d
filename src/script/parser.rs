use super::ast::{BinaryOp, Expr, ExprKind, Literal, Stmt, StmtKind, UnaryOp};
use super::fault::{FaultKind, ScriptFault};
use super::token::{self, Delimiter, Keyword, Operator, Token, TokenSpan};

/// Compiles a fragment that must consist of exactly one expression.
///
/// Assignment is a statement, so `x = 2` fails here; the engine falls
/// back to [`compile_block`] for it.
pub fn compile_expression(source: &str) -> Result<Expr, ScriptFault> {
    let tokens = token::tokenize(source)?;
    Parser::new(tokens).parse_expression_input()
}

/// Compiles a fragment as a statement sequence running to end of input.
pub fn compile_block(source: &str) -> Result<Vec<Stmt>, ScriptFault> {
    let tokens = token::tokenize(source)?;
    Parser::new(tokens).parse_block_input()
}

struct Parser {
    tokens: Vec<TokenSpan>,
    current: usize,
}

impl Parser {
    fn new(tokens: Vec<TokenSpan>) -> Self {
        Self { tokens, current: 0 }
    }

    fn parse_expression_input(mut self) -> Result<Expr, ScriptFault> {
        if self.at_end() {
            return Err(ScriptFault::new(
                FaultKind::SyntaxError,
                "expected an expression",
            ));
        }
        let expression = self.parse_expression()?;
        if !self.at_end() {
            return Err(self.error_at_current("expected a single expression"));
        }
        Ok(expression)
    }

    fn parse_block_input(mut self) -> Result<Vec<Stmt>, ScriptFault> {
        let mut block = Vec::new();
        while !self.at_end() {
            block.push(self.parse_statement()?);
        }
        Ok(block)
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<Stmt, ScriptFault> {
        let statement = match self.peek_keyword() {
            Some(Keyword::Fn) => self.parse_function()?,
            Some(Keyword::Return) => self.parse_return()?,
            Some(Keyword::If) => self.parse_if()?,
            Some(Keyword::While) => self.parse_while()?,
            Some(Keyword::Break) => {
                let line = self.advance().line;
                Stmt {
                    kind: StmtKind::Break,
                    line,
                }
            }
            Some(Keyword::Continue) => {
                let line = self.advance().line;
                Stmt {
                    kind: StmtKind::Continue,
                    line,
                }
            }
            Some(Keyword::Import) => self.parse_import()?,
            _ => {
                if self.peek_is_assignment() {
                    self.parse_assignment()?
                } else {
                    let expression = self.parse_expression()?;
                    Stmt {
                        line: expression.line,
                        kind: StmtKind::Expr(expression),
                    }
                }
            }
        };
        // 文の区切りのセミコロンは任意
        self.matches_delimiter(Delimiter::Semicolon);
        Ok(statement)
    }

    fn parse_function(&mut self) -> Result<Stmt, ScriptFault> {
        let line = self.advance().line; // fn
        let (name, _) = self.consume_identifier("expected function name after 'fn'")?;
        self.consume_delimiter(Delimiter::OpenParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check_delimiter(Delimiter::CloseParen) {
            loop {
                let (param, _) = self.consume_identifier("expected parameter name")?;
                params.push(param);
                if !self.matches_delimiter(Delimiter::Comma) {
                    break;
                }
            }
        }
        self.consume_delimiter(Delimiter::CloseParen, "expected ')' after parameters")?;
        let body = self.parse_braced_block()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef { name, params, body },
            line,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, ScriptFault> {
        let line = self.advance().line; // return
        let value = if self.at_end()
            || self.check_delimiter(Delimiter::Semicolon)
            || self.check_delimiter(Delimiter::CloseBrace)
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        Ok(Stmt {
            kind: StmtKind::Return(value),
            line,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptFault> {
        let line = self.advance().line; // if
        let condition = self.parse_expression()?;
        let then_body = self.parse_braced_block()?;
        let else_body = if self.matches_keyword(Keyword::Else) {
            if self.peek_keyword() == Some(Keyword::If) {
                // else ifは単一のif文を持つelse節として表す
                let nested = self.parse_if()?;
                Some(vec![nested])
            } else {
                Some(self.parse_braced_block()?)
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                condition,
                then_body,
                else_body,
            },
            line,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ScriptFault> {
        let line = self.advance().line; // while
        let condition = self.parse_expression()?;
        let body = self.parse_braced_block()?;
        Ok(Stmt {
            kind: StmtKind::While { condition, body },
            line,
        })
    }

    fn parse_import(&mut self) -> Result<Stmt, ScriptFault> {
        let line = self.advance().line; // import
        let (name, _) = self.consume_identifier("expected module name after 'import'")?;
        Ok(Stmt {
            kind: StmtKind::Import(name),
            line,
        })
    }

    fn parse_assignment(&mut self) -> Result<Stmt, ScriptFault> {
        let (name, line) = self.consume_identifier("expected assignment target")?;
        self.consume_operator(Operator::Equal, "expected '=' in assignment")?;
        let value = self.parse_expression()?;
        Ok(Stmt {
            kind: StmtKind::Assign { name, value },
            line,
        })
    }

    fn parse_braced_block(&mut self) -> Result<Vec<Stmt>, ScriptFault> {
        self.consume_delimiter(Delimiter::OpenBrace, "expected '{' to open the block")?;
        let mut body = Vec::new();
        while !self.check_delimiter(Delimiter::CloseBrace) && !self.at_end() {
            body.push(self.parse_statement()?);
        }
        self.consume_delimiter(Delimiter::CloseBrace, "expected '}' to close the block")?;
        Ok(body)
    }

    fn peek_is_assignment(&self) -> bool {
        matches!(
            self.peek(),
            Some(TokenSpan {
                token: Token::Identifier(_),
                ..
            })
        ) && matches!(
            self.peek_next(),
            Some(TokenSpan {
                token: Token::Operator(Operator::Equal),
                ..
            })
        )
    }

    // ---- expressions, lowest precedence first ----

    fn parse_expression(&mut self) -> Result<Expr, ScriptFault> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ScriptFault> {
        let mut expression = self.parse_and()?;
        while self.matches_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            expression = binary(BinaryOp::Or, expression, right);
        }
        Ok(expression)
    }

    fn parse_and(&mut self) -> Result<Expr, ScriptFault> {
        let mut expression = self.parse_equality()?;
        while self.matches_keyword(Keyword::And) {
            let right = self.parse_equality()?;
            expression = binary(BinaryOp::And, expression, right);
        }
        Ok(expression)
    }

    fn parse_equality(&mut self) -> Result<Expr, ScriptFault> {
        let mut expression = self.parse_comparison()?;
        loop {
            let op = if self.matches_operator(Operator::EqualEqual) {
                BinaryOp::Eq
            } else if self.matches_operator(Operator::NotEqual) {
                BinaryOp::NotEq
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ScriptFault> {
        let mut expression = self.parse_term()?;
        loop {
            let op = if self.matches_operator(Operator::LessEqual) {
                BinaryOp::LtEq
            } else if self.matches_operator(Operator::GreaterEqual) {
                BinaryOp::GtEq
            } else if self.matches_operator(Operator::Less) {
                BinaryOp::Lt
            } else if self.matches_operator(Operator::Greater) {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.parse_term()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    fn parse_term(&mut self) -> Result<Expr, ScriptFault> {
        let mut expression = self.parse_factor()?;
        loop {
            let op = if self.matches_operator(Operator::Plus) {
                BinaryOp::Add
            } else if self.matches_operator(Operator::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_factor()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    fn parse_factor(&mut self) -> Result<Expr, ScriptFault> {
        let mut expression = self.parse_unary()?;
        loop {
            let op = if self.matches_operator(Operator::Multiply) {
                BinaryOp::Mul
            } else if self.matches_operator(Operator::Divide) {
                BinaryOp::Div
            } else if self.matches_operator(Operator::Modulo) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptFault> {
        if self.check_operator(Operator::Minus) {
            let line = self.advance().line;
            let operand = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        if self.peek_keyword() == Some(Keyword::Not) {
            let line = self.advance().line;
            let operand = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptFault> {
        let mut expression = self.parse_primary()?;
        loop {
            if self.matches_delimiter(Delimiter::OpenParen) {
                let mut args = Vec::new();
                if !self.check_delimiter(Delimiter::CloseParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.matches_delimiter(Delimiter::Comma) {
                            break;
                        }
                    }
                }
                self.consume_delimiter(Delimiter::CloseParen, "expected ')' after call arguments")?;
                let line = expression.line;
                expression = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expression),
                        args,
                    },
                    line,
                };
            } else if self.matches_delimiter(Delimiter::OpenBracket) {
                let index = self.parse_expression()?;
                self.consume_delimiter(Delimiter::CloseBracket, "expected ']' after index")?;
                let line = expression.line;
                expression = Expr {
                    kind: ExprKind::Index {
                        target: Box::new(expression),
                        index: Box::new(index),
                    },
                    line,
                };
            } else if self.matches_delimiter(Delimiter::Dot) {
                let (name, _) = self.consume_identifier("expected attribute name after '.'")?;
                let line = expression.line;
                expression = Expr {
                    kind: ExprKind::Attribute {
                        target: Box::new(expression),
                        name,
                    },
                    line,
                };
            } else {
                break;
            }
        }
        Ok(expression)
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptFault> {
        let Some(span) = self.peek() else {
            return Err(ScriptFault::new(
                FaultKind::SyntaxError,
                "expected an expression but reached end of input",
            ));
        };
        let line = span.line;
        let token = span.token.clone();

        match token {
            Token::Int(value) => {
                self.advance();
                Ok(literal(Literal::Int(value), line))
            }
            Token::Float(value) => {
                self.advance();
                Ok(literal(Literal::Float(value), line))
            }
            Token::Str(value) => {
                self.advance();
                Ok(literal(Literal::Str(value), line))
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Ok(literal(Literal::Bool(true), line))
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Ok(literal(Literal::Bool(false), line))
            }
            Token::Keyword(Keyword::None) => {
                self.advance();
                Ok(literal(Literal::None, line))
            }
            Token::Identifier(name) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Name(name),
                    line,
                })
            }
            Token::Delimiter(Delimiter::OpenParen) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume_delimiter(Delimiter::CloseParen, "expected ')' after expression")?;
                Ok(inner)
            }
            Token::Delimiter(Delimiter::OpenBracket) => {
                self.advance();
                let mut items = Vec::new();
                if !self.check_delimiter(Delimiter::CloseBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if !self.matches_delimiter(Delimiter::Comma) {
                            break;
                        }
                    }
                }
                self.consume_delimiter(Delimiter::CloseBracket, "expected ']' after list items")?;
                Ok(Expr {
                    kind: ExprKind::List(items),
                    line,
                })
            }
            _ => Err(self.error_at_current("expected an expression")),
        }
    }

    // ---- token stream helpers ----

    fn peek(&self) -> Option<&TokenSpan> {
        self.tokens.get(self.current)
    }

    fn peek_next(&self) -> Option<&TokenSpan> {
        self.tokens.get(self.current + 1)
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        match self.peek() {
            Some(TokenSpan {
                token: Token::Keyword(keyword),
                ..
            }) => Some(*keyword),
            _ => None,
        }
    }

    fn at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    fn advance(&mut self) -> TokenSpan {
        let span = self.tokens[self.current].clone();
        self.current += 1;
        span
    }

    fn check_operator(&self, operator: Operator) -> bool {
        matches!(
            self.peek(),
            Some(TokenSpan {
                token: Token::Operator(found),
                ..
            }) if *found == operator
        )
    }

    fn matches_operator(&mut self, operator: Operator) -> bool {
        if self.check_operator(operator) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn check_delimiter(&self, delimiter: Delimiter) -> bool {
        matches!(
            self.peek(),
            Some(TokenSpan {
                token: Token::Delimiter(found),
                ..
            }) if *found == delimiter
        )
    }

    fn matches_delimiter(&mut self, delimiter: Delimiter) -> bool {
        if self.check_delimiter(delimiter) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek_keyword() == Some(keyword) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn consume_operator(
        &mut self,
        operator: Operator,
        message: &str,
    ) -> Result<TokenSpan, ScriptFault> {
        if self.check_operator(operator) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn consume_delimiter(
        &mut self,
        delimiter: Delimiter,
        message: &str,
    ) -> Result<TokenSpan, ScriptFault> {
        if self.check_delimiter(delimiter) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<(String, u32), ScriptFault> {
        match self.peek() {
            Some(TokenSpan {
                token: Token::Identifier(name),
                line,
            }) => {
                let result = (name.clone(), *line);
                self.current += 1;
                Ok(result)
            }
            _ => Err(self.error_at_current(message)),
        }
    }

    fn error_at_current(&self, message: &str) -> ScriptFault {
        match self.peek() {
            Some(span) => ScriptFault::new(
                FaultKind::SyntaxError,
                format!("{} but found '{}' (line {})", message, span.token, span.line),
            ),
            None => ScriptFault::new(
                FaultKind::SyntaxError,
                format!("{} but reached end of input", message),
            ),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let line = left.line;
    Expr {
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    }
}

fn literal(value: Literal, line: u32) -> Expr {
    Expr {
        kind: ExprKind::Literal(value),
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        let expression = compile_expression("2 + 3 * 4").unwrap();
        let ExprKind::Binary { op, left, right } = expression.kind else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(left.kind, ExprKind::Literal(Literal::Int(2)));
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_assignment_is_not_an_expression() {
        let fault = compile_expression("x = 2").unwrap_err();
        assert_eq!(fault.kind, FaultKind::SyntaxError);

        let block = compile_block("x = 2").unwrap();
        assert_eq!(block.len(), 1);
        assert!(matches!(
            block[0].kind,
            StmtKind::Assign { ref name, .. } if name == "x"
        ));
    }

    #[test]
    fn test_trailing_tokens_after_an_expression_fail() {
        let fault = compile_expression("1 + 1 2").unwrap_err();
        assert!(fault.message.contains("expected a single expression"));
    }

    #[test]
    fn test_function_definition_with_parameters() {
        let block = compile_block("fn add(a, b) { return a + b }").unwrap();
        let StmtKind::FunctionDef {
            ref name,
            ref params,
            ref body,
        } = block[0].kind
        else {
            panic!("expected a function definition");
        };
        assert_eq!(name, "add");
        assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn test_else_if_chains_nest() {
        let block = compile_block("if a { 1 } else if b { 2 } else { 3 }").unwrap();
        let StmtKind::If { ref else_body, .. } = block[0].kind else {
            panic!("expected an if statement");
        };
        let nested = else_body.as_ref().unwrap();
        assert_eq!(nested.len(), 1);
        let StmtKind::If { ref else_body, .. } = nested[0].kind else {
            panic!("expected a nested if statement");
        };
        assert!(else_body.is_some());
    }

    #[test]
    fn test_while_with_loop_control() {
        let block = compile_block("while x < 3 { x = x + 1; continue } break").unwrap();
        assert_eq!(block.len(), 2);
        assert!(matches!(block[0].kind, StmtKind::While { .. }));
        assert!(matches!(block[1].kind, StmtKind::Break));
    }

    #[test]
    fn test_semicolons_separate_statements() {
        let block = compile_block("x = 1; y = 2; x + y").unwrap();
        assert_eq!(block.len(), 3);
        assert!(matches!(block[2].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn test_postfix_chains() {
        let expression = compile_expression("mathx.table(3)[0]").unwrap();
        let ExprKind::Index { target, .. } = expression.kind else {
            panic!("expected an index expression");
        };
        let ExprKind::Call { callee, .. } = target.kind else {
            panic!("expected a call under the index");
        };
        assert!(matches!(callee.kind, ExprKind::Attribute { .. }));
    }

    #[test]
    fn test_list_literals_and_unary_minus() {
        let expression = compile_expression("[-1, 2.5, \"x\"]").unwrap();
        let ExprKind::List(items) = expression.kind else {
            panic!("expected a list literal");
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(
            items[0].kind,
            ExprKind::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_import_statement() {
        let block = compile_block("import mathx").unwrap();
        assert!(matches!(
            block[0].kind,
            StmtKind::Import(ref name) if name == "mathx"
        ));
    }

    #[test]
    fn test_missing_brace_reports_what_was_expected() {
        let fault = compile_block("fn f() { return 1").unwrap_err();
        assert_eq!(fault.kind, FaultKind::SyntaxError);
        assert!(fault.message.contains("expected '}'"));
    }

    #[test]
    fn test_statement_lines_survive_parsing() {
        let block = compile_block("x = 1\ny = 2").unwrap();
        assert_eq!(block[0].line, 1);
        assert_eq!(block[1].line, 2);
    }

    #[test]
    fn test_empty_source_is_an_empty_block() {
        assert!(compile_block("").unwrap().is_empty());
        assert!(compile_expression("").is_err());
    }
}
