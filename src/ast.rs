/// How a two-sided sequence decides whether its right side runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOp {
    /// `;` runs the right side unconditionally.
    Always,
    /// `&&` runs the right side only if the left side exited zero.
    And,
    /// `||` runs the right side only if the left side exited nonzero.
    Or,
}

/// Which standard descriptor a redirection rewires, and how the target
/// file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirKind {
    /// `< file`: stdin reads from the file.
    In,
    /// `> file`: stdout writes to the file, truncating.
    Out,
    /// `>> file`: stdout appends to the file.
    Append,
    /// `2> file`: stderr writes to the file, truncating.
    Err,
    /// `&> file`: both stdout and stderr write to the file, truncating.
    ErrOut,
}

/// A parsed command expression. The evaluator only ever walks this tree;
/// it never sees raw input text.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A blank line. Still evaluated, so the job table gets swept.
    Empty,
    /// An external command or built-in. `argv[0]` is the command name.
    Simple { argv: Vec<String> },
    /// `left ; right`, `left && right`, `left || right`.
    Sequence {
        op: SeqOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `expr &`: evaluate without waiting.
    Background(Box<Expr>),
    /// `left | right`: left produces, right consumes.
    Pipe { left: Box<Expr>, right: Box<Expr> },
    /// A redirection applied to the whole subexpression in `body`.
    Redirect {
        kind: RedirKind,
        file: String,
        body: Box<Expr>,
    },
}
