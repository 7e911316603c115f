use super::analysis::Analysis;
use crate::ir::{Instruction, Opcode, Operand};
use std::collections::{HashMap, HashSet};

/// A concrete edit one pass proposes on the instruction list
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Replace the instruction at `index`
    Replace { index: usize, with: Instruction },
    /// Delete the instruction at `index`
    Remove { index: usize },
    /// Move the instruction at `index` to just before `before`
    Hoist { index: usize, before: usize },
}

/// A candidate rewrite, scored by the policy before any is applied
#[derive(Debug, Clone)]
pub struct Rewrite {
    /// Name of the proposing pass
    pub pass: &'static str,
    /// Log line for the optimization report
    pub description: String,
    /// The edit itself
    pub action: Action,
}

impl Rewrite {
    /// Applies the edit, producing the next instruction list
    pub fn apply(&self, code: &[Instruction]) -> Vec<Instruction> {
        let mut next = code.to_vec();
        match self.action {
            Action::Replace { index, ref with } => {
                next[index] = with.clone();
            }
            Action::Remove { index } => {
                next.remove(index);
            }
            Action::Hoist { index, before } => {
                debug_assert!(before <= index);
                let moved = next.remove(index);
                next.insert(before, moved);
            }
        }
        next
    }

    /// Primary index the edit touches, used as a deterministic tie-breaker
    pub fn position(&self) -> usize {
        match self.action {
            Action::Replace { index, .. }
            | Action::Remove { index }
            | Action::Hoist { index, .. } => index,
        }
    }
}

/// An optimization pass proposes rewrites; it never applies them itself
pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;

    /// All rewrites this pass considers sound on the current code
    fn candidates(&self, code: &[Instruction], analysis: &Analysis) -> Vec<Rewrite>;
}

// ---------------------------------------------------------------------------
// Constant values and folding arithmetic

/// Constant operand value, with the target language's arithmetic
#[derive(Debug, Clone, PartialEq)]
enum Const {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Const {
    fn of(operand: &Operand) -> Option<Const> {
        match operand {
            Operand::Int(v) => Some(Const::Int(*v)),
            Operand::Float(v) => Some(Const::Float(*v)),
            Operand::Str(s) => Some(Const::Str(s.clone())),
            Operand::Bool(b) => Some(Const::Bool(*b)),
            _ => None,
        }
    }

    fn to_operand(&self) -> Operand {
        match self {
            Const::Int(v) => Operand::Int(*v),
            Const::Float(v) => Operand::Float(*v),
            Const::Str(s) => Operand::Str(s.clone()),
            Const::Bool(b) => Operand::Bool(*b),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Const::Int(v) => Some(*v as f64),
            Const::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Modulo with the sign of the divisor, like the generated code computes it
fn py_mod_i64(a: i64, b: i64) -> i64 {
    ((a % b) + b) % b
}

fn py_mod_f64(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

/// Folds `a op b` when the result is exact and type-preserving
///
/// Division by a zero constant is never folded: the generated code guards
/// it at runtime, and folding would erase that behavior. Division always
/// yields a float even for exact integer quotients.
fn fold_binary(op: Opcode, a: &Const, b: &Const) -> Option<Const> {
    use Const::*;
    match op {
        Opcode::Add => match (a, b) {
            (Int(x), Int(y)) => x.checked_add(*y).map(Int),
            (Str(x), Str(y)) => Some(Str(format!("{}{}", x, y))),
            _ => Some(Float(a.as_f64()? + b.as_f64()?)),
        },
        Opcode::Sub => match (a, b) {
            (Int(x), Int(y)) => x.checked_sub(*y).map(Int),
            _ => Some(Float(a.as_f64()? - b.as_f64()?)),
        },
        Opcode::Mul => match (a, b) {
            (Int(x), Int(y)) => x.checked_mul(*y).map(Int),
            _ => Some(Float(a.as_f64()? * b.as_f64()?)),
        },
        Opcode::Div => {
            let y = b.as_f64()?;
            if y == 0.0 {
                return None;
            }
            Some(Float(a.as_f64()? / y))
        }
        Opcode::Mod => match (a, b) {
            (Int(_), Int(0)) => None,
            (Int(x), Int(y)) => Some(Int(py_mod_i64(*x, *y))),
            _ => {
                let y = b.as_f64()?;
                if y == 0.0 {
                    return None;
                }
                Some(Float(py_mod_f64(a.as_f64()?, y)))
            }
        },
        Opcode::Eq | Opcode::Ne => {
            let equal = match (a, b) {
                (Str(x), Str(y)) => x == y,
                (Bool(x), Bool(y)) => x == y,
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x == y,
                    // Different, incomparable types are simply unequal.
                    _ => false,
                },
            };
            Some(Bool(if op == Opcode::Eq { equal } else { !equal }))
        }
        Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge => {
            let ordering = match (a, b) {
                (Str(x), Str(y)) => x.partial_cmp(y),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            }?;
            let holds = match op {
                Opcode::Lt => ordering.is_lt(),
                Opcode::Gt => ordering.is_gt(),
                Opcode::Le => ordering.is_le(),
                Opcode::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Some(Bool(holds))
        }
        _ => None,
    }
}

fn fold_unary(op: Opcode, a: &Const) -> Option<Const> {
    match (op, a) {
        (Opcode::Neg, Const::Int(v)) => v.checked_neg().map(Const::Int),
        (Opcode::Neg, Const::Float(v)) => Some(Const::Float(-v)),
        (Opcode::Not, Const::Bool(b)) => Some(Const::Bool(!b)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Passes

/// Replaces operations on constant operands with the computed constant
///
/// Also propagates constants: a name assigned a constant exactly once can
/// be read as that constant by later pure instructions, which unlocks more
/// folding and leaves the assignment dead for elimination.
pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant_folding"
    }

    fn candidates(&self, code: &[Instruction], _analysis: &Analysis) -> Vec<Rewrite> {
        let mut rewrites = Vec::new();
        for (i, instr) in code.iter().enumerate() {
            let Some(dest) = instr.dest.clone() else {
                continue;
            };

            let folded = if instr.op.is_binary() {
                let a = instr.a.as_ref().and_then(Const::of);
                let b = instr.b.as_ref().and_then(Const::of);
                match (a, b) {
                    (Some(a), Some(b)) => fold_binary(instr.op, &a, &b),
                    _ => None,
                }
            } else if matches!(instr.op, Opcode::Neg | Opcode::Not) {
                instr
                    .a
                    .as_ref()
                    .and_then(Const::of)
                    .and_then(|a| fold_unary(instr.op, &a))
            } else {
                None
            };

            if let Some(value) = folded {
                let with = Instruction::assign(dest, value.to_operand(), instr.line);
                rewrites.push(Rewrite {
                    pass: self.name(),
                    description: format!("{} -> {}", instr, with),
                    action: Action::Replace { index: i, with },
                });
            }
        }

        let mut def_counts: HashMap<&str, usize> = HashMap::new();
        for instr in code {
            if let Some(name) = instr.defined() {
                *def_counts.entry(name).or_insert(0) += 1;
            }
        }
        for (i, instr) in code.iter().enumerate() {
            if instr.op != Opcode::Assign {
                continue;
            }
            let (Some(dest), Some(value)) = (instr.defined(), instr.a.as_ref()) else {
                continue;
            };
            // Single static definition means every read sees this value.
            if !value.is_const() || def_counts.get(dest) != Some(&1) {
                continue;
            }
            for (j, user) in code.iter().enumerate().skip(i + 1) {
                if user.has_side_effect() || !user.uses().contains(&dest) {
                    continue;
                }
                let mut with = user.clone();
                substitute(&mut with.a, dest, value);
                substitute(&mut with.b, dest, value);
                rewrites.push(Rewrite {
                    pass: self.name(),
                    description: format!("{} -> {}", user, with),
                    action: Action::Replace { index: j, with },
                });
            }
        }
        rewrites
    }
}

/// Replaces a read of `name` with a constant value
fn substitute(slot: &mut Option<Operand>, name: &str, value: &Operand) {
    if let Some(operand) = slot {
        if operand.name() == Some(name) {
            *operand = value.clone();
        }
    }
}

/// Rewrites expensive operations into cheaper equivalent ones
///
/// Restricted to integer constants: `x * 2.0` or `x + 0.0` coerce an
/// integer `x` to float, so rewriting them would change result types.
pub struct StrengthReduction;

impl Pass for StrengthReduction {
    fn name(&self) -> &'static str {
        "strength_reduction"
    }

    fn candidates(&self, code: &[Instruction], _analysis: &Analysis) -> Vec<Rewrite> {
        let mut rewrites = Vec::new();
        for (i, instr) in code.iter().enumerate() {
            let (Some(dest), Some(a), Some(b)) = (&instr.dest, &instr.a, &instr.b) else {
                continue;
            };

            let with = match instr.op {
                Opcode::Mul => match (a, b) {
                    (x, Operand::Int(2)) | (Operand::Int(2), x) if x.name().is_some() => {
                        Some(Instruction::binary(
                            Opcode::Add,
                            dest.clone(),
                            x.clone(),
                            x.clone(),
                            instr.line,
                        ))
                    }
                    (x, Operand::Int(1)) | (Operand::Int(1), x) if x.name().is_some() => {
                        Some(Instruction::assign(dest.clone(), x.clone(), instr.line))
                    }
                    _ => None,
                },
                Opcode::Add => match (a, b) {
                    (x, Operand::Int(0)) | (Operand::Int(0), x) if x.name().is_some() => {
                        Some(Instruction::assign(dest.clone(), x.clone(), instr.line))
                    }
                    _ => None,
                },
                Opcode::Sub => match (a, b) {
                    (x, Operand::Int(0)) if x.name().is_some() => {
                        Some(Instruction::assign(dest.clone(), x.clone(), instr.line))
                    }
                    _ => None,
                },
                _ => None,
            };

            if let Some(with) = with {
                rewrites.push(Rewrite {
                    pass: self.name(),
                    description: format!("{} -> {}", instr, with),
                    action: Action::Replace { index: i, with },
                });
            }
        }
        rewrites
    }
}

/// Reuses the result of an identical earlier computation
///
/// Straight-line only: a label, jump, call, or scan between the two
/// occurrences ends the window, as does any write to an involved name.
pub struct CommonSubexpression;

impl Pass for CommonSubexpression {
    fn name(&self) -> &'static str {
        "common_subexpression"
    }

    fn candidates(&self, code: &[Instruction], _analysis: &Analysis) -> Vec<Rewrite> {
        let mut rewrites = Vec::new();

        for (i, first) in code.iter().enumerate() {
            if !first.op.is_binary() {
                continue;
            }
            let Some(first_dest) = first.defined() else {
                continue;
            };

            let mut involved: HashSet<&str> = first.uses().into_iter().collect();
            involved.insert(first_dest);

            for (j, second) in code.iter().enumerate().skip(i + 1) {
                if second.is_control()
                    || matches!(
                        second.op,
                        Opcode::Call
                            | Opcode::Scan
                            | Opcode::Func
                            | Opcode::EndFunc
                            | Opcode::Return
                    )
                {
                    break;
                }
                let repeats =
                    second.op == first.op && second.a == first.a && second.b == first.b;
                if repeats {
                    if let Some(second_dest) = second.dest.clone() {
                        let with = Instruction::assign(
                            second_dest,
                            clone_name(first, first_dest),
                            second.line,
                        );
                        rewrites.push(Rewrite {
                            pass: self.name(),
                            description: format!("{} -> {}", second, with),
                            action: Action::Replace { index: j, with },
                        });
                    }
                    break;
                }
                // A write to any involved name invalidates the window.
                if let Some(def) = second.defined() {
                    if involved.contains(def) {
                        break;
                    }
                }
            }
        }
        rewrites
    }
}

/// Keeps the temp/var flavor of the first result when reusing it
fn clone_name(first: &Instruction, name: &str) -> Operand {
    match first.dest {
        Some(Operand::Var(_)) => Operand::Var(name.to_string()),
        _ => Operand::Temp(name.to_string()),
    }
}

/// Removes pure instructions whose result is never read
pub struct DeadCode;

impl Pass for DeadCode {
    fn name(&self) -> &'static str {
        "dead_code"
    }

    fn candidates(&self, code: &[Instruction], analysis: &Analysis) -> Vec<Rewrite> {
        let mut rewrites = Vec::new();
        for (i, instr) in code.iter().enumerate() {
            if instr.has_side_effect() {
                continue;
            }
            let Some(dest) = instr.defined() else {
                continue;
            };
            if !analysis.live_out[i].contains(dest) {
                rewrites.push(Rewrite {
                    pass: self.name(),
                    description: format!("removed {}", instr),
                    action: Action::Remove { index: i },
                });
            }
        }
        rewrites
    }
}

/// Moves computations whose operands never change inside a loop out of it
pub struct LoopInvariant;

impl Pass for LoopInvariant {
    fn name(&self) -> &'static str {
        "loop_invariant"
    }

    fn candidates(&self, code: &[Instruction], analysis: &Analysis) -> Vec<Rewrite> {
        let mut rewrites = Vec::new();

        for l in &analysis.loops {
            let defined_in_loop: Vec<&str> = (l.start..=l.end)
                .filter_map(|k| code[k].defined())
                .collect();

            for i in (l.start + 1)..l.end {
                let instr = &code[i];
                if instr.has_side_effect() {
                    continue;
                }
                let Some(dest) = instr.defined() else {
                    continue;
                };

                let operands_invariant = instr
                    .uses()
                    .iter()
                    .all(|name| !defined_in_loop.contains(name));
                if !operands_invariant {
                    continue;
                }

                // One definition in the loop, and not live at loop entry:
                // hoisting then cannot change any value the loop observes.
                let defs_of_dest = defined_in_loop.iter().filter(|d| **d == dest).count();
                if defs_of_dest != 1 {
                    continue;
                }
                if analysis.live_in[l.start].contains(dest) {
                    continue;
                }

                rewrites.push(Rewrite {
                    pass: self.name(),
                    description: format!("hoisted {} out of loop", instr),
                    action: Action::Hoist {
                        index: i,
                        before: l.start,
                    },
                });
            }
        }
        rewrites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(n: &str) -> Operand {
        Operand::Temp(n.to_string())
    }

    fn var(n: &str) -> Operand {
        Operand::Var(n.to_string())
    }

    #[test]
    fn test_fold_int_addition_stays_int() {
        let folded = fold_binary(Opcode::Add, &Const::Int(2), &Const::Int(3));
        assert_eq!(folded, Some(Const::Int(5)));
    }

    #[test]
    fn test_fold_division_always_float() {
        let folded = fold_binary(Opcode::Div, &Const::Int(6), &Const::Int(3));
        assert_eq!(folded, Some(Const::Float(2.0)));
    }

    #[test]
    fn test_division_by_zero_never_folds() {
        assert_eq!(fold_binary(Opcode::Div, &Const::Int(1), &Const::Int(0)), None);
        assert_eq!(fold_binary(Opcode::Mod, &Const::Int(1), &Const::Int(0)), None);
        assert_eq!(
            fold_binary(Opcode::Div, &Const::Float(1.0), &Const::Float(0.0)),
            None
        );
    }

    #[test]
    fn test_modulo_sign_follows_divisor() {
        assert_eq!(
            fold_binary(Opcode::Mod, &Const::Int(-7), &Const::Int(3)),
            Some(Const::Int(2))
        );
    }

    #[test]
    fn test_overflow_never_folds() {
        assert_eq!(
            fold_binary(Opcode::Mul, &Const::Int(i64::MAX), &Const::Int(2)),
            None
        );
    }

    #[test]
    fn test_string_concat_folds() {
        let folded = fold_binary(
            Opcode::Add,
            &Const::Str("a".into()),
            &Const::Str("b".into()),
        );
        assert_eq!(folded, Some(Const::Str("ab".into())));
    }

    #[test]
    fn test_mixed_numeric_equality() {
        assert_eq!(
            fold_binary(Opcode::Eq, &Const::Int(1), &Const::Float(1.0)),
            Some(Const::Bool(true))
        );
        assert_eq!(
            fold_binary(Opcode::Eq, &Const::Int(1), &Const::Str("1".into())),
            Some(Const::Bool(false))
        );
    }

    #[test]
    fn test_folding_candidate_shape() {
        let code = vec![Instruction::binary(
            Opcode::Add,
            temp("t1"),
            Operand::Int(2),
            Operand::Int(3),
            1,
        )];
        let analysis = Analysis::of(&code);
        let rewrites = ConstantFolding.candidates(&code, &analysis);
        assert_eq!(rewrites.len(), 1);
        let next = rewrites[0].apply(&code);
        assert_eq!(next[0].to_string(), "t1 = 5");
    }

    #[test]
    fn test_constant_propagation_feeds_folding() {
        let code = vec![
            Instruction::assign(temp("t1"), Operand::Int(5), 1),
            Instruction::binary(Opcode::Mul, temp("t2"), temp("t1"), Operand::Int(1), 1),
        ];
        let analysis = Analysis::of(&code);
        let rewrites = ConstantFolding.candidates(&code, &analysis);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].apply(&code)[1].to_string(), "t2 = 5 * 1");
    }

    #[test]
    fn test_no_propagation_past_second_definition() {
        let code = vec![
            Instruction::assign(var("x"), Operand::Int(1), 1),
            Instruction::assign(var("x"), Operand::Int(2), 2),
            Instruction::binary(Opcode::Add, temp("t1"), var("x"), Operand::Int(1), 3),
        ];
        let analysis = Analysis::of(&code);
        assert!(ConstantFolding.candidates(&code, &analysis).is_empty());
    }

    #[test]
    fn test_no_propagation_into_print() {
        let code = vec![
            Instruction::assign(var("x"), Operand::Int(7), 1),
            Instruction::print(var("x"), 2),
        ];
        let analysis = Analysis::of(&code);
        assert!(ConstantFolding.candidates(&code, &analysis).is_empty());
    }

    #[test]
    fn test_strength_reduction_double() {
        let code = vec![Instruction::binary(
            Opcode::Mul,
            temp("t1"),
            var("x"),
            Operand::Int(2),
            1,
        )];
        let analysis = Analysis::of(&code);
        let rewrites = StrengthReduction.candidates(&code, &analysis);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].apply(&code)[0].to_string(), "t1 = x + x");
    }

    #[test]
    fn test_strength_reduction_skips_float_identity() {
        // x * 1.0 coerces x to float; leaving it alone is the only safe move.
        let code = vec![Instruction::binary(
            Opcode::Mul,
            temp("t1"),
            var("x"),
            Operand::Float(1.0),
            1,
        )];
        let analysis = Analysis::of(&code);
        assert!(StrengthReduction.candidates(&code, &analysis).is_empty());
    }

    #[test]
    fn test_cse_straight_line() {
        let code = vec![
            Instruction::binary(Opcode::Add, temp("t1"), var("a"), var("b"), 1),
            Instruction::binary(Opcode::Add, temp("t2"), var("a"), var("b"), 1),
        ];
        let analysis = Analysis::of(&code);
        let rewrites = CommonSubexpression.candidates(&code, &analysis);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].apply(&code)[1].to_string(), "t2 = t1");
    }

    #[test]
    fn test_cse_blocked_by_write() {
        let code = vec![
            Instruction::binary(Opcode::Add, temp("t1"), var("a"), var("b"), 1),
            Instruction::assign(var("a"), Operand::Int(9), 1),
            Instruction::binary(Opcode::Add, temp("t2"), var("a"), var("b"), 1),
        ];
        let analysis = Analysis::of(&code);
        assert!(CommonSubexpression.candidates(&code, &analysis).is_empty());
    }

    #[test]
    fn test_cse_never_crosses_function_bodies() {
        // f and h both compute g + 1; each body must keep its own temp.
        let code = vec![
            Instruction::func("f", 1),
            Instruction::binary(Opcode::Add, temp("t1"), var("g"), Operand::Int(1), 1),
            Instruction::ret(Some(temp("t1")), 1),
            Instruction::end_func(1),
            Instruction::func("h", 2),
            Instruction::binary(Opcode::Add, temp("t2"), var("g"), Operand::Int(1), 2),
            Instruction::ret(Some(temp("t2")), 2),
            Instruction::end_func(2),
        ];
        let analysis = Analysis::of(&code);
        assert!(CommonSubexpression.candidates(&code, &analysis).is_empty());
    }

    #[test]
    fn test_cse_blocked_by_label() {
        let code = vec![
            Instruction::binary(Opcode::Add, temp("t1"), var("a"), var("b"), 1),
            Instruction::label("L1", 1),
            Instruction::binary(Opcode::Add, temp("t2"), var("a"), var("b"), 1),
        ];
        let analysis = Analysis::of(&code);
        assert!(CommonSubexpression.candidates(&code, &analysis).is_empty());
    }

    #[test]
    fn test_dead_code_found() {
        let code = vec![
            Instruction::binary(Opcode::Add, temp("t1"), Operand::Int(1), Operand::Int(2), 1),
            Instruction::print(var("x"), 1),
        ];
        let analysis = Analysis::of(&code);
        let rewrites = DeadCode.candidates(&code, &analysis);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].apply(&code).len(), 1);
    }

    #[test]
    fn test_print_never_dead() {
        let code = vec![Instruction::print(var("x"), 1)];
        let analysis = Analysis::of(&code);
        assert!(DeadCode.candidates(&code, &analysis).is_empty());
    }

    #[test]
    fn test_loop_invariant_hoisted() {
        // L1: t1 = a * b; x = x + t1; c = x < 9; IF_FALSE c GOTO L2 ... GOTO L1; L2:
        let code = vec![
            Instruction::label("L1", 1),
            Instruction::binary(Opcode::Mul, temp("t1"), var("a"), var("b"), 1),
            Instruction::binary(Opcode::Add, var("x"), var("x"), temp("t1"), 1),
            Instruction::binary(Opcode::Lt, temp("t2"), var("x"), Operand::Int(9), 1),
            Instruction::if_false(temp("t2"), "L2", 1),
            Instruction::goto("L1", 1),
            Instruction::label("L2", 1),
        ];
        let analysis = Analysis::of(&code);
        let rewrites = LoopInvariant.candidates(&code, &analysis);
        let hoists: Vec<_> = rewrites
            .iter()
            .filter(|r| r.description.contains("t1 = a * b"))
            .collect();
        assert_eq!(hoists.len(), 1);
        let next = hoists[0].apply(&code);
        assert_eq!(next[0].to_string(), "t1 = a * b");
        assert_eq!(next[1].to_string(), "L1:");
    }

    #[test]
    fn test_loop_variant_not_hoisted() {
        // x changes every iteration, so x + 1 must stay inside.
        let code = vec![
            Instruction::label("L1", 1),
            Instruction::binary(Opcode::Add, temp("t1"), var("x"), Operand::Int(1), 1),
            Instruction::assign(var("x"), temp("t1"), 1),
            Instruction::goto("L1", 1),
        ];
        let analysis = Analysis::of(&code);
        assert!(LoopInvariant.candidates(&code, &analysis).is_empty());
    }
}
