/// Recursive-descent parser for the trellis declaration language.
use crate::ast::*;
use crate::lexer::{LexError, Lexer, SpannedToken, Token};
use std::fmt;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self {
            line: e.line,
            col: e.col,
            message: e.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn parse(input: &str) -> Result<File, ParseError> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;
        let mut parser = Self { tokens, pos: 0 };
        parser.parse_file()
    }

    // -- Helpers --

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn current_span(&self) -> (usize, usize) {
        let t = &self.tokens[self.pos];
        (t.line, t.col)
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos].token;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            let (line, col) = self.current_span();
            Err(ParseError {
                line,
                col,
                message: format!("expected {expected}, got {}", self.peek()),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            other => {
                let (line, col) = self.current_span();
                Err(ParseError {
                    line,
                    col,
                    message: format!("expected identifier, got {other}"),
                })
            }
        }
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    // -- Top-level --

    fn parse_file(&mut self) -> Result<File, ParseError> {
        let namespace = self.parse_namespace_decl()?;
        let mut uses = Vec::new();
        while self.at(&Token::Use) {
            uses.push(self.parse_use_decl()?);
        }
        let mut items = Vec::new();
        while !self.at(&Token::Eof) {
            items.push(self.parse_item()?);
        }
        Ok(File {
            namespace,
            uses,
            items,
        })
    }

    fn parse_namespace_decl(&mut self) -> Result<NamespaceDecl, ParseError> {
        self.expect(&Token::Namespace)?;
        let path = self.parse_path()?;
        Ok(NamespaceDecl { path })
    }

    fn parse_use_decl(&mut self) -> Result<UseDecl, ParseError> {
        self.expect(&Token::Use)?;
        let path = self.parse_path()?;
        Ok(UseDecl { path })
    }

    fn parse_path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut path = vec![self.expect_ident()?];
        while self.eat(&Token::Dot) {
            path.push(self.expect_ident()?);
        }
        Ok(path)
    }

    // -- Items --

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        let markers = self.parse_markers()?;
        let (line, col) = self.current_span();
        match self.peek() {
            Token::Class => {
                self.advance();
                Ok(Item::Class(self.parse_class(markers, line, col)?))
            }
            Token::Interface => {
                if !markers.is_empty() {
                    return Err(ParseError {
                        line,
                        col,
                        message: "markers apply to classes, not interfaces".to_string(),
                    });
                }
                self.advance();
                Ok(Item::Interface(self.parse_interface(line, col)?))
            }
            other => Err(ParseError {
                line,
                col,
                message: format!("expected class or interface, got {other}"),
            }),
        }
    }

    fn parse_markers(&mut self) -> Result<Vec<Marker>, ParseError> {
        let mut markers = Vec::new();
        while self.eat(&Token::At) {
            let (line, col) = self.current_span();
            let name = self.expect_ident()?;
            let marker = match name.as_str() {
                "entity" => Marker::Entity,
                "component" => Marker::Component(self.parse_marker_arg()?),
                "dependency" => Marker::Dependency(self.parse_marker_arg()?),
                other => {
                    return Err(ParseError {
                        line,
                        col,
                        message: format!("unknown marker '@{other}'"),
                    })
                }
            };
            markers.push(marker);
        }
        Ok(markers)
    }

    fn parse_marker_arg(&mut self) -> Result<TypeRef, ParseError> {
        self.expect(&Token::LParen)?;
        let arg = self.parse_type_ref()?;
        self.expect(&Token::RParen)?;
        Ok(arg)
    }

    fn parse_class(
        &mut self,
        markers: Vec<Marker>,
        line: usize,
        col: usize,
    ) -> Result<ClassDecl, ParseError> {
        let name = self.expect_ident()?;
        let generic_params = self.parse_generic_params()?;
        let bases = self.parse_base_list()?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        if self.eat(&Token::LBrace) {
            while !self.eat(&Token::RBrace) {
                match self.peek() {
                    Token::Var => {
                        self.advance();
                        let field_name = self.expect_ident()?;
                        self.expect(&Token::Colon)?;
                        let ty = self.parse_type_ref()?;
                        fields.push(FieldDecl {
                            name: field_name,
                            ty,
                        });
                    }
                    Token::Fn => {
                        self.advance();
                        methods.push(self.parse_method()?);
                    }
                    other => {
                        let (line, col) = self.current_span();
                        return Err(ParseError {
                            line,
                            col,
                            message: format!("expected var, fn or }}, got {other}"),
                        });
                    }
                }
            }
        }

        Ok(ClassDecl {
            name,
            generic_params,
            markers,
            bases,
            fields,
            methods,
            line,
            col,
        })
    }

    fn parse_method(&mut self) -> Result<MethodDecl, ParseError> {
        let name = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen) {
            if !params.is_empty() {
                self.expect(&Token::Comma)?;
            }
            let param_name = self.expect_ident()?;
            self.expect(&Token::Colon)?;
            let ty = self.parse_type_ref()?;
            params.push(FieldDecl {
                name: param_name,
                ty,
            });
        }
        let ret = if self.eat(&Token::Arrow) {
            Some(self.parse_type_ref()?)
        } else {
            None
        };
        Ok(MethodDecl { name, params, ret })
    }

    fn parse_interface(&mut self, line: usize, col: usize) -> Result<InterfaceDecl, ParseError> {
        let name = self.expect_ident()?;
        let generic_params = self.parse_generic_params()?;
        let bases = self.parse_base_list()?;
        Ok(InterfaceDecl {
            name,
            generic_params,
            bases,
            line,
            col,
        })
    }

    fn parse_generic_params(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if self.eat(&Token::LAngle) {
            loop {
                params.push(self.expect_ident()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RAngle)?;
        }
        Ok(params)
    }

    fn parse_base_list(&mut self) -> Result<Vec<TypeRef>, ParseError> {
        let mut bases = Vec::new();
        if self.eat(&Token::Colon) {
            loop {
                bases.push(self.parse_type_ref()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        Ok(bases)
    }

    // -- Types --

    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let path = self.parse_path()?;
        let mut args = Vec::new();
        if self.eat(&Token::LAngle) {
            loop {
                args.push(self.parse_type_ref()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RAngle)?;
        }
        Ok(TypeRef { path, args })
    }
}
