use crate::error::{Error, Result};
use crate::ir::{Instruction, Opcode, Operand};

/// Runtime helpers prepended to every generated program
///
/// `_scan` mirrors the source language's input rule: try int, then float,
/// then fall back to zero. Stdout is line-buffered so output produced
/// before a timeout kill still reaches the caller.
const PRELUDE: &str = "\
import sys

sys.stdout.reconfigure(line_buffering=True)

def _scan():
    value = sys.stdin.readline().strip()
    try:
        return int(value)
    except ValueError:
        pass
    try:
        return float(value)
    except ValueError:
        return 0
";

/// Generates Python from three-address code
///
/// The label graph produced by lowering is structured: every loop is a
/// label with one backward jump, every branch a forward IF_FALSE with an
/// optional else-jump. The generator rebuilds `while`/`if` nesting from
/// those shapes; a jump that fits no shape is a refusal, not a panic.
pub struct PythonGenerator<'a> {
    code: &'a [Instruction],
    lines: Vec<String>,
    pending_args: Vec<String>,
}

impl<'a> PythonGenerator<'a> {
    pub fn new(code: &'a [Instruction]) -> Self {
        PythonGenerator {
            code,
            lines: Vec::new(),
            pending_args: Vec::new(),
        }
    }

    /// Produces the complete Python program text
    pub fn generate(mut self) -> Result<String> {
        let len = self.code.len();
        self.gen_range(0, len, None, 0)?;

        let mut output = String::from(PRELUDE);
        output.push('\n');
        if self.lines.is_empty() {
            output.push_str("pass\n");
        } else {
            for line in &self.lines {
                output.push_str(line);
                output.push('\n');
            }
        }
        Ok(output)
    }

    /// Emits statements for `code[start..end]` at the given indent
    ///
    /// `loop_labels` is the innermost loop's (start, exit) pair, for
    /// mapping jumps to `continue` and `break`.
    fn gen_range(
        &mut self,
        start: usize,
        end: usize,
        loop_labels: Option<(String, String)>,
        indent: usize,
    ) -> Result<()> {
        let mut i = start;
        while i < end {
            let instr = &self.code[i];
            match instr.op {
                Opcode::Label => {
                    let name = instr.label_name().unwrap_or_default().to_string();
                    match self.closing_goto(&name, i + 1, end) {
                        Some(j) => {
                            // Backward jump closes a loop over [i+1, j).
                            let exit = self
                                .code
                                .get(j + 1)
                                .and_then(|l| l.label_name())
                                .unwrap_or_default()
                                .to_string();
                            self.emit(indent, "while True:");
                            let before = self.lines.len();
                            self.gen_range(i + 1, j, Some((name, exit)), indent + 1)?;
                            if self.lines.len() == before {
                                self.emit(indent + 1, "pass");
                            }
                            i = j + 1;
                        }
                        None => {
                            // Join point only; nothing to emit.
                            i += 1;
                        }
                    }
                }

                Opcode::IfFalse => {
                    let cond = python_operand(instr.a.as_ref())?;
                    let target = instr.jump_target().unwrap_or_default().to_string();

                    if let Some((_, ref exit)) = loop_labels {
                        if &target == exit {
                            self.emit(indent, &format!("if not {}:", cond));
                            self.emit(indent + 1, "break");
                            i += 1;
                            continue;
                        }
                    }

                    let Some(k) = self.find_label(&target, i + 1, end) else {
                        return Err(Error::CodegenRefused {
                            reason: format!("branch to {} leaves the current structure", target),
                        });
                    };

                    // An else branch exists when the then-branch ends with a
                    // forward jump over the else code to a join label.
                    let else_jump = if k > i + 1 {
                        self.code[k - 1]
                            .jump_target()
                            .filter(|_| self.code[k - 1].op == Opcode::Goto)
                            .and_then(|m| self.find_label(m, k + 1, end))
                    } else {
                        None
                    };

                    self.emit(indent, &format!("if {}:", cond));
                    match else_jump {
                        Some(m) => {
                            let before = self.lines.len();
                            self.gen_range(i + 1, k - 1, loop_labels.clone(), indent + 1)?;
                            if self.lines.len() == before {
                                self.emit(indent + 1, "pass");
                            }
                            self.emit(indent, "else:");
                            let before = self.lines.len();
                            self.gen_range(k + 1, m, loop_labels.clone(), indent + 1)?;
                            if self.lines.len() == before {
                                self.emit(indent + 1, "pass");
                            }
                            i = m + 1;
                        }
                        None => {
                            let before = self.lines.len();
                            self.gen_range(i + 1, k, loop_labels.clone(), indent + 1)?;
                            if self.lines.len() == before {
                                self.emit(indent + 1, "pass");
                            }
                            i = k + 1;
                        }
                    }
                }

                Opcode::Goto => {
                    let target = instr.jump_target().unwrap_or_default();
                    match loop_labels {
                        Some((ref start_label, _)) if target == start_label => {
                            self.emit(indent, "continue");
                        }
                        Some((_, ref exit)) if target == exit => {
                            self.emit(indent, "break");
                        }
                        _ => {
                            return Err(Error::CodegenRefused {
                                reason: format!("jump to {} fits no loop or branch", target),
                            });
                        }
                    }
                    i += 1;
                }

                Opcode::Func => {
                    let name = operand_name(instr.a.as_ref())?;
                    let mut params = Vec::new();
                    let mut p = i + 1;
                    while p < end && self.code[p].op == Opcode::Param {
                        params.push(operand_name(self.code[p].a.as_ref())?);
                        p += 1;
                    }
                    let Some(e) = (p..end).find(|&k| self.code[k].op == Opcode::EndFunc) else {
                        return Err(Error::CodegenRefused {
                            reason: format!("function {} has no end", name),
                        });
                    };

                    self.emit(indent, &format!("def {}({}):", name, params.join(", ")));
                    // A bare assignment inside a def creates a local, so
                    // writes to the enclosing program's variables need an
                    // explicit global declaration.
                    for global in self.assigned_globals(p, e) {
                        self.emit(indent + 1, &format!("global {}", global));
                    }
                    let before = self.lines.len();
                    self.gen_range(p, e, None, indent + 1)?;
                    if self.lines.len() == before {
                        self.emit(indent + 1, "pass");
                    }
                    self.lines.push(String::new());
                    i = e + 1;
                }

                Opcode::Arg => {
                    self.pending_args.push(python_operand(instr.a.as_ref())?);
                    i += 1;
                }

                Opcode::Call => {
                    let name = operand_name(instr.a.as_ref())?;
                    let dest = python_operand(instr.dest.as_ref())?;
                    let args = std::mem::take(&mut self.pending_args);
                    self.emit(
                        indent,
                        &format!("{} = {}({})", dest, name, args.join(", ")),
                    );
                    i += 1;
                }

                Opcode::Return => {
                    match instr.a {
                        Some(ref value) => {
                            let value = python_operand(Some(value))?;
                            self.emit(indent, &format!("return {}", value));
                        }
                        None => self.emit(indent, "return"),
                    }
                    i += 1;
                }

                Opcode::Assign => {
                    let dest = python_operand(instr.dest.as_ref())?;
                    let value = python_operand(instr.a.as_ref())?;
                    self.emit(indent, &format!("{} = {}", dest, value));
                    i += 1;
                }

                Opcode::Print => {
                    let value = python_operand(instr.a.as_ref())?;
                    self.emit(indent, &format!("print({})", value));
                    i += 1;
                }

                Opcode::Scan => {
                    let target = python_operand(instr.a.as_ref())?;
                    self.emit(indent, &format!("{} = _scan()", target));
                    i += 1;
                }

                Opcode::Neg => {
                    let dest = python_operand(instr.dest.as_ref())?;
                    let a = python_operand(instr.a.as_ref())?;
                    self.emit(indent, &format!("{} = -{}", dest, a));
                    i += 1;
                }

                Opcode::Not => {
                    let dest = python_operand(instr.dest.as_ref())?;
                    let a = python_operand(instr.a.as_ref())?;
                    self.emit(indent, &format!("{} = not {}", dest, a));
                    i += 1;
                }

                Opcode::Div | Opcode::Mod => {
                    // Division by zero yields zero instead of crashing.
                    let dest = python_operand(instr.dest.as_ref())?;
                    let a = python_operand(instr.a.as_ref())?;
                    let b = python_operand(instr.b.as_ref())?;
                    let symbol = if instr.op == Opcode::Div { "/" } else { "%" };
                    self.emit(
                        indent,
                        &format!("{} = {} {} {} if {} != 0 else 0", dest, a, symbol, b, b),
                    );
                    i += 1;
                }

                op if op.is_binary() => {
                    let dest = python_operand(instr.dest.as_ref())?;
                    let a = python_operand(instr.a.as_ref())?;
                    let b = python_operand(instr.b.as_ref())?;
                    let symbol = op.symbol().unwrap_or("?");
                    self.emit(indent, &format!("{} = {} {} {}", dest, a, symbol, b));
                    i += 1;
                }

                Opcode::Param | Opcode::EndFunc => {
                    return Err(Error::CodegenRefused {
                        reason: format!("{} outside a function region", instr),
                    });
                }

                _ => {
                    return Err(Error::CodegenRefused {
                        reason: format!("no translation for {}", instr),
                    });
                }
            }
        }
        Ok(())
    }

    /// Variables a function body writes that belong to the main program
    fn assigned_globals(&self, start: usize, end: usize) -> Vec<String> {
        let outer = main_region_names(self.code);
        let mut globals: Vec<String> = Vec::new();
        for instr in &self.code[start..end] {
            let target = match instr.op {
                Opcode::Scan => instr.a.as_ref(),
                _ => instr.dest.as_ref(),
            };
            if let Some(Operand::Var(name)) = target {
                if outer.contains(name) && !globals.contains(name) {
                    globals.push(name.clone());
                }
            }
        }
        globals.sort();
        globals
    }

    /// The last backward jump to `label` within the range, if any
    fn closing_goto(&self, label: &str, start: usize, end: usize) -> Option<usize> {
        (start..end)
            .rev()
            .find(|&j| self.code[j].op == Opcode::Goto && self.code[j].jump_target() == Some(label))
    }

    fn find_label(&self, label: &str, start: usize, end: usize) -> Option<usize> {
        (start..end).find(|&k| self.code[k].label_name() == Some(label))
    }

    fn emit(&mut self, indent: usize, text: &str) {
        self.lines.push(format!("{}{}", "    ".repeat(indent), text));
    }
}

/// Renders an operand as a Python expression
fn python_operand(operand: Option<&Operand>) -> Result<String> {
    let operand = operand.ok_or_else(|| Error::CodegenRefused {
        reason: "instruction missing an operand".to_string(),
    })?;
    Ok(match operand {
        Operand::Temp(n) | Operand::Var(n) => n.clone(),
        Operand::Int(v) => v.to_string(),
        Operand::Float(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                format!("{:.1}", v)
            } else {
                v.to_string()
            }
        }
        Operand::Str(s) => {
            let mut literal = String::from("\"");
            for c in s.chars() {
                match c {
                    '\n' => literal.push_str("\\n"),
                    '\t' => literal.push_str("\\t"),
                    '\r' => literal.push_str("\\r"),
                    '\\' => literal.push_str("\\\\"),
                    '"' => literal.push_str("\\\""),
                    c => literal.push(c),
                }
            }
            literal.push('"');
            literal
        }
        Operand::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Operand::Label(l) => {
            return Err(Error::CodegenRefused {
                reason: format!("label {} used as a value", l),
            });
        }
    })
}

/// Named variables the main program itself touches
fn main_region_names(code: &[Instruction]) -> std::collections::HashSet<String> {
    let mut names = std::collections::HashSet::new();
    let mut in_function = false;
    for instr in code {
        match instr.op {
            Opcode::Func => {
                in_function = true;
                continue;
            }
            Opcode::EndFunc => {
                in_function = false;
                continue;
            }
            _ => {}
        }
        if in_function {
            continue;
        }
        for slot in [&instr.a, &instr.b, &instr.dest] {
            if let Some(Operand::Var(name)) = slot.as_ref() {
                names.insert(name.clone());
            }
        }
    }
    names
}

fn operand_name(operand: Option<&Operand>) -> Result<String> {
    operand
        .and_then(Operand::name)
        .map(str::to_string)
        .ok_or_else(|| Error::CodegenRefused {
            reason: "expected a name operand".to_string(),
        })
}
