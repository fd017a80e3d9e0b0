//! SQL parser
//!
//! Recursive-descent parser over the lexer's token stream. Accepts exactly
//! one statement, optionally terminated by `;`, and fails fast with a
//! positioned syntax error, producing no partial AST.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{SpannedToken, Token};
use crate::catalog::types::DataType;
use crate::error::{Error, Result};

/// SQL parser
pub struct Parser {
    tokens: Vec<SpannedToken>,
    position: usize,
}

impl Parser {
    /// Create a parser from SQL text
    pub fn new(sql: &str) -> Result<Self> {
        let tokens = Lexer::new(sql).tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse exactly one statement from SQL text
    pub fn parse_statement(sql: &str) -> Result<Statement> {
        let mut parser = Self::new(sql)?;
        let stmt = parser.parse_stmt()?;

        if parser.check(&Token::Semicolon) {
            parser.advance();
        }
        if !parser.check(&Token::Eof) {
            return Err(parser.error_here("expected end of statement"));
        }
        Ok(stmt)
    }

    fn parse_stmt(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Select => self.parse_select().map(Statement::Select),
            Token::Insert => self.parse_insert().map(Statement::Insert),
            Token::Update => self.parse_update().map(Statement::Update),
            Token::Delete => self.parse_delete().map(Statement::Delete),
            Token::Create => self.parse_create(),
            Token::Drop => self.parse_drop(),
            Token::Explain => {
                self.advance();
                if !self.check(&Token::Select) {
                    return Err(self.error_here("EXPLAIN supports only SELECT"));
                }
                self.parse_select().map(Statement::Explain)
            }
            _ => Err(self.error_here(
                "expected SELECT, INSERT, UPDATE, DELETE, CREATE, DROP or EXPLAIN",
            )),
        }
    }

    // ========== SELECT ==========

    fn parse_select(&mut self) -> Result<Select> {
        self.expect(&Token::Select)?;

        let projection = self.parse_projection()?;

        self.expect(&Token::From)?;
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        while self.is_join_start() {
            joins.push(self.parse_join()?);
        }

        let filter = if self.check(&Token::Where) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.check(&Token::Group) {
            self.advance();
            self.expect(&Token::By)?;
            loop {
                group_by.push(self.parse_column_ref()?);
                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }

        let having = if self.check(&Token::Having) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.check(&Token::Order) {
            self.advance();
            self.expect(&Token::By)?;
            loop {
                let column = self.parse_column_ref()?;
                let ascending = if self.check(&Token::Desc) {
                    self.advance();
                    false
                } else {
                    if self.check(&Token::Asc) {
                        self.advance();
                    }
                    true
                };
                order_by.push(OrderKey { column, ascending });
                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }

        let limit = if self.check(&Token::Limit) {
            self.advance();
            match self.current().clone() {
                Token::IntegerLiteral(n) if n >= 0 => {
                    self.advance();
                    Some(n as u64)
                }
                _ => return Err(self.error_here("LIMIT expects a non-negative integer")),
            }
        } else {
            None
        };

        Ok(Select {
            projection,
            from,
            joins,
            filter,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn parse_projection(&mut self) -> Result<Vec<SelectItem>> {
        if self.check(&Token::Asterisk) {
            self.advance();
            return Ok(vec![SelectItem::Wildcard]);
        }

        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let alias = if self.check(&Token::As) {
                self.advance();
                Some(self.expect_identifier()?)
            } else {
                None
            };
            items.push(SelectItem::Expr { expr, alias });

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }
        Ok(items)
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let name = self.expect_identifier()?;
        let alias = match self.current() {
            Token::Identifier(alias) => {
                let alias = alias.clone();
                self.advance();
                Some(alias)
            }
            _ => None,
        };
        Ok(TableRef { name, alias })
    }

    fn is_join_start(&self) -> bool {
        matches!(
            self.current(),
            Token::Join | Token::Inner | Token::Left | Token::Right | Token::Cross
        )
    }

    fn parse_join(&mut self) -> Result<Join> {
        let kind = match self.current() {
            Token::Inner => {
                self.advance();
                JoinKind::Inner
            }
            Token::Left => {
                self.advance();
                if self.check(&Token::Outer) {
                    self.advance();
                }
                JoinKind::Left
            }
            Token::Right | Token::Cross => {
                return Err(self.error_here("only INNER and LEFT joins are supported"));
            }
            _ => JoinKind::Inner, // bare JOIN
        };
        self.expect(&Token::Join)?;
        let table = self.parse_table_ref()?;
        self.expect(&Token::On)?;
        let on = self.parse_expr()?;
        Ok(Join { kind, table, on })
    }

    // ========== INSERT ==========

    fn parse_insert(&mut self) -> Result<Insert> {
        self.expect(&Token::Insert)?;
        self.expect(&Token::Into)?;
        let table = self.expect_identifier()?;

        let columns = if self.check(&Token::LParen) {
            self.advance();
            let cols = self.parse_identifier_list()?;
            self.expect(&Token::RParen)?;
            Some(cols)
        } else {
            None
        };

        self.expect(&Token::Values)?;

        let mut rows = Vec::new();
        loop {
            self.expect(&Token::LParen)?;
            rows.push(self.parse_expr_list()?);
            self.expect(&Token::RParen)?;
            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(Insert {
            table,
            columns,
            rows,
        })
    }

    // ========== UPDATE ==========

    fn parse_update(&mut self) -> Result<Update> {
        self.expect(&Token::Update)?;
        let table = self.expect_identifier()?;
        self.expect(&Token::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            self.expect(&Token::Eq)?;
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });
            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        let filter = if self.check(&Token::Where) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Update {
            table,
            assignments,
            filter,
        })
    }

    // ========== DELETE ==========

    fn parse_delete(&mut self) -> Result<Delete> {
        self.expect(&Token::Delete)?;
        self.expect(&Token::From)?;
        let table = self.expect_identifier()?;

        let filter = if self.check(&Token::Where) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Delete { table, filter })
    }

    // ========== CREATE / DROP ==========

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect(&Token::Create)?;
        match self.current() {
            Token::Table => self.parse_create_table().map(Statement::CreateTable),
            Token::Index => self.parse_create_index().map(Statement::CreateIndex),
            _ => Err(self.error_here("expected TABLE or INDEX")),
        }
    }

    fn parse_create_table(&mut self) -> Result<CreateTable> {
        self.expect(&Token::Table)?;
        let table = self.expect_identifier()?;
        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            if self.check(&Token::Primary) || self.check(&Token::Foreign) {
                constraints.push(self.parse_table_constraint()?);
            } else {
                columns.push(self.parse_column_def()?);
            }
            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(&Token::RParen)?;
        Ok(CreateTable {
            table,
            columns,
            constraints,
        })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_identifier()?;
        let data_type = self.parse_data_type()?;

        let mut constraints = Vec::new();
        loop {
            match self.current() {
                Token::Primary => {
                    self.advance();
                    self.expect(&Token::Key)?;
                    constraints.push(ColumnConstraint::PrimaryKey);
                }
                Token::Unique => {
                    self.advance();
                    constraints.push(ColumnConstraint::Unique);
                }
                Token::Not => {
                    self.advance();
                    self.expect(&Token::Null)?;
                    constraints.push(ColumnConstraint::NotNull);
                }
                Token::References => {
                    self.advance();
                    let table = self.expect_identifier()?;
                    self.expect(&Token::LParen)?;
                    let column = self.expect_identifier()?;
                    self.expect(&Token::RParen)?;
                    constraints.push(ColumnConstraint::References { table, column });
                }
                _ => break,
            }
        }

        Ok(ColumnDef {
            name,
            data_type,
            constraints,
        })
    }

    fn parse_data_type(&mut self) -> Result<DataType> {
        let dt = match self.current() {
            Token::Int | Token::Integer => {
                self.advance();
                DataType::Integer
            }
            Token::Float => {
                self.advance();
                DataType::Float
            }
            Token::Varchar => {
                self.advance();
                self.expect(&Token::LParen)?;
                let len = match self.current().clone() {
                    Token::IntegerLiteral(n) if n > 0 => {
                        self.advance();
                        n as usize
                    }
                    _ => return Err(self.error_here("VARCHAR expects a positive length")),
                };
                self.expect(&Token::RParen)?;
                DataType::Varchar(len)
            }
            Token::Date => {
                self.advance();
                DataType::Date
            }
            Token::Boolean => {
                self.advance();
                DataType::Boolean
            }
            _ => return Err(self.error_here("expected a data type")),
        };
        Ok(dt)
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint> {
        if self.check(&Token::Primary) {
            self.advance();
            self.expect(&Token::Key)?;
            self.expect(&Token::LParen)?;
            let column = self.expect_identifier()?;
            self.expect(&Token::RParen)?;
            Ok(TableConstraint::PrimaryKey { column })
        } else {
            self.expect(&Token::Foreign)?;
            self.expect(&Token::Key)?;
            self.expect(&Token::LParen)?;
            let column = self.expect_identifier()?;
            self.expect(&Token::RParen)?;
            self.expect(&Token::References)?;
            let ref_table = self.expect_identifier()?;
            self.expect(&Token::LParen)?;
            let ref_column = self.expect_identifier()?;
            self.expect(&Token::RParen)?;
            Ok(TableConstraint::ForeignKey {
                column,
                ref_table,
                ref_column,
            })
        }
    }

    fn parse_create_index(&mut self) -> Result<CreateIndex> {
        self.expect(&Token::Index)?;
        let name = self.expect_identifier()?;
        self.expect(&Token::On)?;
        let table = self.expect_identifier()?;
        self.expect(&Token::LParen)?;
        let column = self.expect_identifier()?;
        self.expect(&Token::RParen)?;
        Ok(CreateIndex {
            name,
            table,
            column,
        })
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect(&Token::Drop)?;
        self.expect(&Token::Table)?;
        let table = self.expect_identifier()?;
        Ok(Statement::DropTable(DropTable { table }))
    }

    // ========== Expressions ==========
    //
    // Precedence climb, loosest first:
    //   OR < AND < NOT < comparison < additive < multiplicative < unary < primary

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.check(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.check(&Token::Not) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;

        match self.current() {
            Token::Is => {
                self.advance();
                let negated = if self.check(&Token::Not) {
                    self.advance();
                    true
                } else {
                    false
                };
                self.expect(&Token::Null)?;
                Ok(Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                })
            }
            Token::Like => {
                self.advance();
                let pattern = self.parse_additive()?;
                Ok(Expr::Like {
                    expr: Box::new(left),
                    pattern: Box::new(pattern),
                })
            }
            Token::In => {
                self.advance();
                self.expect(&Token::LParen)?;
                let list = self.parse_expr_list()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::InList {
                    expr: Box::new(left),
                    list,
                })
            }
            Token::Eq | Token::Neq | Token::Lt | Token::Lte | Token::Gt | Token::Gte => {
                let op = match self.current() {
                    Token::Eq => BinaryOp::Eq,
                    Token::Neq => BinaryOp::Neq,
                    Token::Lt => BinaryOp::Lt,
                    Token::Lte => BinaryOp::Lte,
                    Token::Gt => BinaryOp::Gt,
                    _ => BinaryOp::Gte,
                };
                self.advance();
                let right = self.parse_additive()?;
                Ok(Expr::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }
            _ => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Asterisk => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.check(&Token::Minus) {
            self.advance();
            let inner = self.parse_unary()?;
            // Fold a negated numeric literal.
            return Ok(match inner {
                Expr::Literal(Literal::Integer(n)) => {
                    Expr::Literal(Literal::Integer(n.wrapping_neg()))
                }
                Expr::Literal(Literal::Float(n)) => Expr::Literal(Literal::Float(-n)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current().clone() {
            Token::IntegerLiteral(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Integer(n)))
            }
            Token::FloatLiteral(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(n)))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Text(s)))
            }
            Token::DateLiteral(d) => {
                self.advance();
                Ok(Expr::Literal(Literal::Date(d)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::Count | Token::Sum | Token::Avg | Token::Min | Token::Max => {
                self.parse_aggregate()
            }
            Token::Identifier(_) => self.parse_column_ref().map(Expr::Column),
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn parse_aggregate(&mut self) -> Result<Expr> {
        let func = match self.current() {
            Token::Count => AggFunc::Count,
            Token::Sum => AggFunc::Sum,
            Token::Avg => AggFunc::Avg,
            Token::Min => AggFunc::Min,
            _ => AggFunc::Max,
        };
        self.advance();
        self.expect(&Token::LParen)?;

        let arg = if self.check(&Token::Asterisk) {
            if func != AggFunc::Count {
                return Err(self.error_here("only COUNT accepts *"));
            }
            self.advance();
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        self.expect(&Token::RParen)?;
        Ok(Expr::Aggregate { func, arg })
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef> {
        let first = self.expect_identifier()?;
        if self.check(&Token::Dot) {
            self.advance();
            let column = self.expect_identifier()?;
            Ok(ColumnRef {
                table: Some(first),
                column,
            })
        } else {
            Ok(ColumnRef {
                table: None,
                column: first,
            })
        }
    }

    // ========== Helpers ==========

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr()?);
            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }
        Ok(exprs)
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        loop {
            names.push(self.expect_identifier()?);
            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }
        Ok(names)
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.position)
            .map(|s| s.pos)
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(&format!(
                "expected {}, found {}",
                token,
                self.current()
            )))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(&format!("expected identifier, found {}", other))),
        }
    }

    fn error_here(&self, msg: &str) -> Error {
        Error::Syntax {
            pos: self.current_pos(),
            msg: msg.to_string(),
        }
    }
}
