use std::fmt;

/// An operand of a three-address instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Compiler temporary, `t1`, `t2`, ...
    Temp(String),
    /// Source-level variable
    Var(String),
    /// Integer constant
    Int(i64),
    /// Floating-point constant
    Float(f64),
    /// String constant
    Str(String),
    /// Boolean constant
    Bool(bool),
    /// Jump target, `L1`, `L2`, ...
    Label(String),
}

impl Operand {
    /// True for constants that can participate in folding
    pub fn is_const(&self) -> bool {
        matches!(
            self,
            Operand::Int(_) | Operand::Float(_) | Operand::Str(_) | Operand::Bool(_)
        )
    }

    /// The name carried by a temp or variable operand
    pub fn name(&self) -> Option<&str> {
        match self {
            Operand::Temp(n) | Operand::Var(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Temp(n) | Operand::Var(n) | Operand::Label(n) => write!(f, "{}", n),
            Operand::Int(v) => write!(f, "{}", v),
            // Integral floats keep their ".0" so the numeric type stays
            // visible in the text form.
            Operand::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Operand::Str(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        '\\' => write!(f, "\\\\")?,
                        '"' => write!(f, "\\\"")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            Operand::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
        }
    }
}

/// Three-address instruction opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `dest = a`
    Assign,
    /// `dest = a + b`
    Add,
    /// `dest = a - b`
    Sub,
    /// `dest = a * b`
    Mul,
    /// `dest = a / b`
    Div,
    /// `dest = a % b`
    Mod,
    /// `dest = a == b`
    Eq,
    /// `dest = a != b`
    Ne,
    /// `dest = a < b`
    Lt,
    /// `dest = a > b`
    Gt,
    /// `dest = a <= b`
    Le,
    /// `dest = a >= b`
    Ge,
    /// `dest = -a`
    Neg,
    /// `dest = !a`
    Not,
    /// `PRINT a`
    Print,
    /// `SCAN a`, reads one input value into variable `a`
    Scan,
    /// `name:`, jump target
    Label,
    /// `GOTO label`
    Goto,
    /// `IF_FALSE a GOTO label`
    IfFalse,
    /// `FUNC name`, opens a function region
    Func,
    /// `PARAM name`, declares the next parameter
    Param,
    /// `ENDFUNC`, closes the function region
    EndFunc,
    /// `ARG a`, stages an argument for the next call
    Arg,
    /// `dest = CALL name, argc`
    Call,
    /// `RETURN a` or bare `RETURN`
    Return,
}

impl Opcode {
    /// The source operator symbol for binary arithmetic and comparison ops
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Opcode::Add => Some("+"),
            Opcode::Sub => Some("-"),
            Opcode::Mul => Some("*"),
            Opcode::Div => Some("/"),
            Opcode::Mod => Some("%"),
            Opcode::Eq => Some("=="),
            Opcode::Ne => Some("!="),
            Opcode::Lt => Some("<"),
            Opcode::Gt => Some(">"),
            Opcode::Le => Some("<="),
            Opcode::Ge => Some(">="),
            _ => None,
        }
    }

    /// True for `dest = a op b` instructions
    pub fn is_binary(&self) -> bool {
        self.symbol().is_some()
    }
}

/// One three-address instruction
///
/// The operand slots are optional because most opcodes use only a subset;
/// the constructors keep the shapes consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Operation
    pub op: Opcode,
    /// First operand
    pub a: Option<Operand>,
    /// Second operand
    pub b: Option<Operand>,
    /// Destination
    pub dest: Option<Operand>,
    /// Source line this instruction was lowered from
    pub line: usize,
}

impl Instruction {
    pub fn assign(dest: Operand, a: Operand, line: usize) -> Self {
        Instruction {
            op: Opcode::Assign,
            a: Some(a),
            b: None,
            dest: Some(dest),
            line,
        }
    }

    pub fn binary(op: Opcode, dest: Operand, a: Operand, b: Operand, line: usize) -> Self {
        debug_assert!(op.is_binary());
        Instruction {
            op,
            a: Some(a),
            b: Some(b),
            dest: Some(dest),
            line,
        }
    }

    pub fn unary(op: Opcode, dest: Operand, a: Operand, line: usize) -> Self {
        debug_assert!(matches!(op, Opcode::Neg | Opcode::Not));
        Instruction {
            op,
            a: Some(a),
            b: None,
            dest: Some(dest),
            line,
        }
    }

    pub fn print(a: Operand, line: usize) -> Self {
        Instruction {
            op: Opcode::Print,
            a: Some(a),
            b: None,
            dest: None,
            line,
        }
    }

    pub fn scan(var: Operand, line: usize) -> Self {
        Instruction {
            op: Opcode::Scan,
            a: Some(var),
            b: None,
            dest: None,
            line,
        }
    }

    pub fn label(name: &str, line: usize) -> Self {
        Instruction {
            op: Opcode::Label,
            a: Some(Operand::Label(name.to_string())),
            b: None,
            dest: None,
            line,
        }
    }

    pub fn goto(target: &str, line: usize) -> Self {
        Instruction {
            op: Opcode::Goto,
            a: Some(Operand::Label(target.to_string())),
            b: None,
            dest: None,
            line,
        }
    }

    pub fn if_false(cond: Operand, target: &str, line: usize) -> Self {
        Instruction {
            op: Opcode::IfFalse,
            a: Some(cond),
            b: Some(Operand::Label(target.to_string())),
            dest: None,
            line,
        }
    }

    pub fn func(name: &str, line: usize) -> Self {
        Instruction {
            op: Opcode::Func,
            a: Some(Operand::Var(name.to_string())),
            b: None,
            dest: None,
            line,
        }
    }

    pub fn param(name: &str, line: usize) -> Self {
        Instruction {
            op: Opcode::Param,
            a: Some(Operand::Var(name.to_string())),
            b: None,
            dest: None,
            line,
        }
    }

    pub fn end_func(line: usize) -> Self {
        Instruction {
            op: Opcode::EndFunc,
            a: None,
            b: None,
            dest: None,
            line,
        }
    }

    pub fn arg(a: Operand, line: usize) -> Self {
        Instruction {
            op: Opcode::Arg,
            a: Some(a),
            b: None,
            dest: None,
            line,
        }
    }

    pub fn call(dest: Operand, name: &str, argc: usize, line: usize) -> Self {
        Instruction {
            op: Opcode::Call,
            a: Some(Operand::Var(name.to_string())),
            b: Some(Operand::Int(argc as i64)),
            dest: Some(dest),
            line,
        }
    }

    pub fn ret(value: Option<Operand>, line: usize) -> Self {
        Instruction {
            op: Opcode::Return,
            a: value,
            b: None,
            dest: None,
            line,
        }
    }

    /// The name written by this instruction, if any
    ///
    /// `SCAN x` writes its operand; everything else writes `dest`.
    pub fn defined(&self) -> Option<&str> {
        match self.op {
            Opcode::Scan => self.a.as_ref().and_then(Operand::name),
            _ => self.dest.as_ref().and_then(Operand::name),
        }
    }

    /// Names read by this instruction
    ///
    /// SCAN writes rather than reads its operand; FUNC, PARAM, and CALL
    /// carry names that are not variable reads.
    pub fn uses(&self) -> Vec<&str> {
        if matches!(
            self.op,
            Opcode::Scan | Opcode::Func | Opcode::Param | Opcode::Call
        ) {
            return Vec::new();
        }
        let mut names = Vec::new();
        if let Some(name) = self.a.as_ref().and_then(Operand::name) {
            names.push(name);
        }
        if let Some(name) = self.b.as_ref().and_then(Operand::name) {
            names.push(name);
        }
        names
    }

    /// True when removing this instruction could change observable behavior
    /// even if its result is never read
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self.op,
            Opcode::Print
                | Opcode::Scan
                | Opcode::Label
                | Opcode::Goto
                | Opcode::IfFalse
                | Opcode::Func
                | Opcode::Param
                | Opcode::EndFunc
                | Opcode::Arg
                | Opcode::Call
                | Opcode::Return
        )
    }

    /// True for labels and jumps
    pub fn is_control(&self) -> bool {
        matches!(self.op, Opcode::Label | Opcode::Goto | Opcode::IfFalse)
    }

    /// The jump target of a GOTO or IF_FALSE
    pub fn jump_target(&self) -> Option<&str> {
        match self.op {
            Opcode::Goto => match self.a {
                Some(Operand::Label(ref l)) => Some(l),
                _ => None,
            },
            Opcode::IfFalse => match self.b {
                Some(Operand::Label(ref l)) => Some(l),
                _ => None,
            },
            _ => None,
        }
    }

    /// The label name defined by a LABEL instruction
    pub fn label_name(&self) -> Option<&str> {
        match (self.op, &self.a) {
            (Opcode::Label, Some(Operand::Label(l))) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let a = self.a.as_ref();
        let b = self.b.as_ref();
        let dest = self.dest.as_ref();

        match self.op {
            Opcode::Assign => write!(f, "{} = {}", opt(dest), opt(a)),
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Le
            | Opcode::Ge => write!(
                f,
                "{} = {} {} {}",
                opt(dest),
                opt(a),
                self.op.symbol().unwrap_or("?"),
                opt(b)
            ),
            Opcode::Neg => write!(f, "{} = -{}", opt(dest), opt(a)),
            Opcode::Not => write!(f, "{} = !{}", opt(dest), opt(a)),
            Opcode::Print => write!(f, "PRINT {}", opt(a)),
            Opcode::Scan => write!(f, "SCAN {}", opt(a)),
            Opcode::Label => write!(f, "{}:", opt(a)),
            Opcode::Goto => write!(f, "GOTO {}", opt(a)),
            Opcode::IfFalse => write!(f, "IF_FALSE {} GOTO {}", opt(a), opt(b)),
            Opcode::Func => write!(f, "FUNC {}", opt(a)),
            Opcode::Param => write!(f, "PARAM {}", opt(a)),
            Opcode::EndFunc => write!(f, "ENDFUNC"),
            Opcode::Arg => write!(f, "ARG {}", opt(a)),
            Opcode::Call => write!(f, "{} = CALL {}, {}", opt(dest), opt(a), opt(b)),
            Opcode::Return => match a {
                Some(value) => write!(f, "RETURN {}", value),
                None => write!(f, "RETURN"),
            },
        }
    }
}

fn opt(operand: Option<&Operand>) -> String {
    operand.map(|o| o.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        let add = Instruction::binary(
            Opcode::Add,
            Operand::Temp("t1".into()),
            Operand::Int(2),
            Operand::Int(3),
            1,
        );
        assert_eq!(add.to_string(), "t1 = 2 + 3");

        let branch = Instruction::if_false(Operand::Temp("t1".into()), "L2", 1);
        assert_eq!(branch.to_string(), "IF_FALSE t1 GOTO L2");

        assert_eq!(Instruction::label("L1", 1).to_string(), "L1:");
        assert_eq!(Instruction::goto("L1", 1).to_string(), "GOTO L1");
        assert_eq!(
            Instruction::print(Operand::Var("x".into()), 1).to_string(),
            "PRINT x"
        );
        assert_eq!(
            Instruction::scan(Operand::Var("x".into()), 1).to_string(),
            "SCAN x"
        );
    }

    #[test]
    fn test_integral_float_keeps_point() {
        assert_eq!(Operand::Float(5.0).to_string(), "5.0");
        assert_eq!(Operand::Float(2.5).to_string(), "2.5");
        assert_eq!(Operand::Int(5).to_string(), "5");
    }

    #[test]
    fn test_call_display() {
        let call = Instruction::call(Operand::Temp("t2".into()), "add", 2, 1);
        assert_eq!(call.to_string(), "t2 = CALL add, 2");
        assert_eq!(
            Instruction::arg(Operand::Temp("t1".into()), 1).to_string(),
            "ARG t1"
        );
    }

    #[test]
    fn test_def_use_sets() {
        let add = Instruction::binary(
            Opcode::Add,
            Operand::Temp("t1".into()),
            Operand::Var("x".into()),
            Operand::Var("y".into()),
            1,
        );
        assert_eq!(add.defined(), Some("t1"));
        assert_eq!(add.uses(), vec!["x", "y"]);

        let scan = Instruction::scan(Operand::Var("x".into()), 1);
        assert_eq!(scan.defined(), Some("x"));
        assert!(scan.uses().is_empty());
    }

    #[test]
    fn test_jump_targets() {
        assert_eq!(Instruction::goto("L3", 1).jump_target(), Some("L3"));
        assert_eq!(
            Instruction::if_false(Operand::Temp("t1".into()), "L4", 1).jump_target(),
            Some("L4")
        );
        assert_eq!(Instruction::label("L3", 1).label_name(), Some("L3"));
    }
}
