// Typed AST. Tagged variants with a common `Meta` carrying the node's
// position and any comments the parser attached to it.

use crate::compiler::lexer::Position;
use smol_str::SmolStr;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub position: Position,
    pub leading_comments: Vec<String>,
    pub trailing_comment: Option<String>,
}

impl Meta {
    pub fn at(position: Position) -> Self {
        Meta {
            position,
            leading_comments: Vec::new(),
            trailing_comment: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
    BNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil(Meta),
    True(Meta),
    False(Meta),
    Int(i64, Meta),
    Float(f64, Meta),
    Str(String, Meta),
    Vararg(Meta),
    Name(SmolStr, Meta),
    /// `a.b` and `a[k]` both lower to an index with an expression key.
    Index {
        obj: Box<Expr>,
        key: Box<Expr>,
        meta: Meta,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        meta: Meta,
    },
    MethodCall {
        obj: Box<Expr>,
        name: SmolStr,
        args: Vec<Expr>,
        meta: Meta,
    },
    Function(Box<FuncBody>, Meta),
    Table(Vec<TableItem>, Meta),
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        meta: Meta,
    },
    UnOp {
        op: UnOp,
        operand: Box<Expr>,
        meta: Meta,
    },
    /// Parenthesized expression; truncates a multi-value inside to one value.
    Paren(Box<Expr>, Meta),
}

impl Expr {
    pub fn meta(&self) -> &Meta {
        match self {
            Expr::Nil(m)
            | Expr::True(m)
            | Expr::False(m)
            | Expr::Int(_, m)
            | Expr::Float(_, m)
            | Expr::Str(_, m)
            | Expr::Vararg(m)
            | Expr::Name(_, m)
            | Expr::Function(_, m)
            | Expr::Table(_, m)
            | Expr::Paren(_, m) => m,
            Expr::Index { meta, .. }
            | Expr::Call { meta, .. }
            | Expr::MethodCall { meta, .. }
            | Expr::BinOp { meta, .. }
            | Expr::UnOp { meta, .. } => meta,
        }
    }

    pub fn position(&self) -> Position {
        self.meta().position
    }

    /// True for expressions that expand to all their values when they sit in
    /// the last slot of an expression list.
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            Expr::Call { .. } | Expr::MethodCall { .. } | Expr::Vararg(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableItem {
    /// `{ expr }` - appended to the sequence part.
    Positional(Expr),
    /// `{ name = expr }`
    Named(SmolStr, Expr),
    /// `{ [key] = expr }`
    Keyed(Expr, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    pub params: Vec<SmolStr>,
    pub is_vararg: bool,
    pub block: Block,
    pub position: Position,
    /// Declared name when the literal came from a function statement;
    /// carried into the prototype for tracebacks.
    pub name: Option<String>,
}

/// `function a.b.c:m` target path.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncName {
    pub base: SmolStr,
    pub path: Vec<SmolStr>,
    pub method: Option<SmolStr>,
}

impl FuncName {
    pub fn dotted(&self) -> String {
        let mut s = self.base.to_string();
        for part in &self.path {
            s.push('.');
            s.push_str(part);
        }
        if let Some(m) = &self.method {
            s.push(':');
            s.push_str(m);
        }
        s
    }
}

pub type Block = Vec<Stat>;

#[derive(Debug, Clone, PartialEq)]
pub enum Stat {
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
        meta: Meta,
    },
    Local {
        names: Vec<SmolStr>,
        values: Vec<Expr>,
        meta: Meta,
    },
    /// Call or method call in statement position.
    Call(Expr, Meta),
    Do(Block, Meta),
    While {
        cond: Expr,
        body: Block,
        meta: Meta,
    },
    Repeat {
        body: Block,
        cond: Expr,
        meta: Meta,
    },
    If {
        /// Condition/block arms: `if`, then every `elseif`.
        arms: Vec<(Expr, Block)>,
        else_block: Option<Block>,
        meta: Meta,
    },
    NumericFor {
        var: SmolStr,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
        meta: Meta,
    },
    GenericFor {
        names: Vec<SmolStr>,
        exprs: Vec<Expr>,
        body: Block,
        meta: Meta,
    },
    Function {
        name: FuncName,
        body: Box<FuncBody>,
        meta: Meta,
    },
    LocalFunction {
        name: SmolStr,
        body: Box<FuncBody>,
        meta: Meta,
    },
    Return {
        exprs: Vec<Expr>,
        meta: Meta,
    },
    Break(Meta),
    /// Parsed for diagnostics; the compiler rejects them.
    Goto(SmolStr, Meta),
    Label(SmolStr, Meta),
}

impl Stat {
    pub fn meta(&self) -> &Meta {
        match self {
            Stat::Assign { meta, .. }
            | Stat::Local { meta, .. }
            | Stat::Call(_, meta)
            | Stat::Do(_, meta)
            | Stat::While { meta, .. }
            | Stat::Repeat { meta, .. }
            | Stat::If { meta, .. }
            | Stat::NumericFor { meta, .. }
            | Stat::GenericFor { meta, .. }
            | Stat::Function { meta, .. }
            | Stat::LocalFunction { meta, .. }
            | Stat::Return { meta, .. }
            | Stat::Break(meta)
            | Stat::Goto(_, meta)
            | Stat::Label(_, meta) => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Stat::Assign { meta, .. }
            | Stat::Local { meta, .. }
            | Stat::Call(_, meta)
            | Stat::Do(_, meta)
            | Stat::While { meta, .. }
            | Stat::Repeat { meta, .. }
            | Stat::If { meta, .. }
            | Stat::NumericFor { meta, .. }
            | Stat::GenericFor { meta, .. }
            | Stat::Function { meta, .. }
            | Stat::LocalFunction { meta, .. }
            | Stat::Return { meta, .. }
            | Stat::Break(meta)
            | Stat::Goto(_, meta)
            | Stat::Label(_, meta) => meta,
        }
    }

    pub fn position(&self) -> Position {
        self.meta().position
    }
}
