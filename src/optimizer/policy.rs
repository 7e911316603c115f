use super::analysis::Analysis;
use super::passes::{Action, Rewrite};
use crate::ir::{Instruction, Opcode};

/// Static cost of executing one instruction once
///
/// Each named operand adds a fetch cost on top of the opcode's base cost,
/// so the constant-operand form of an instruction is strictly cheaper than
/// the same instruction reading variables.
pub fn instruction_cost(instr: &Instruction) -> i64 {
    let base = match instr.op {
        Opcode::Assign => 1,
        Opcode::Add
        | Opcode::Sub
        | Opcode::Eq
        | Opcode::Ne
        | Opcode::Lt
        | Opcode::Gt
        | Opcode::Le
        | Opcode::Ge
        | Opcode::Neg
        | Opcode::Not => 2,
        Opcode::Mul => 4,
        Opcode::Div | Opcode::Mod => 5,
        Opcode::Print | Opcode::Scan => 3,
        Opcode::Label | Opcode::Func | Opcode::Param | Opcode::EndFunc => 0,
        Opcode::Goto | Opcode::IfFalse | Opcode::Arg | Opcode::Return => 1,
        Opcode::Call => 5,
    };
    base + instr.uses().len() as i64
}

/// Estimated execution count multiplier at a loop nesting depth
fn weight(depth: usize) -> i64 {
    1 + 9 * depth as i64
}

/// Ranks candidate rewrites; the selector applies the highest-scoring one
///
/// Scores are estimated saved cost, so zero or negative means the rewrite
/// is not worth applying. Implementations must be deterministic: the same
/// code and candidate always score the same.
pub trait ScoringPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, rewrite: &Rewrite, code: &[Instruction], analysis: &Analysis) -> i64;
}

/// Default policy: static instruction costs weighted by loop depth
///
/// An instruction inside a loop is assumed to run many times, so edits
/// there are worth proportionally more than the same edit in straight-line
/// code.
pub struct StaticCostPolicy;

impl ScoringPolicy for StaticCostPolicy {
    fn name(&self) -> &'static str {
        "static_cost"
    }

    fn score(&self, rewrite: &Rewrite, code: &[Instruction], analysis: &Analysis) -> i64 {
        match rewrite.action {
            Action::Replace { index, ref with } => {
                let saved = instruction_cost(&code[index]) - instruction_cost(with);
                saved * weight(analysis.loop_depth[index])
            }
            Action::Remove { index } => {
                instruction_cost(&code[index]) * weight(analysis.loop_depth[index])
            }
            Action::Hoist { index, before } => {
                // The hoisted instruction still runs, just outside the loop.
                let outside_depth = analysis.loop_depth[before].saturating_sub(1);
                let saved = weight(analysis.loop_depth[index]) - weight(outside_depth);
                instruction_cost(&code[index]) * saved
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    fn temp(n: &str) -> Operand {
        Operand::Temp(n.to_string())
    }

    fn var(n: &str) -> Operand {
        Operand::Var(n.to_string())
    }

    #[test]
    fn test_replace_scores_saved_cost() {
        let code = vec![Instruction::binary(
            Opcode::Mul,
            temp("t1"),
            Operand::Int(2),
            Operand::Int(3),
            1,
        )];
        let analysis = Analysis::of(&code);
        let rewrite = Rewrite {
            pass: "constant_folding",
            description: String::new(),
            action: Action::Replace {
                index: 0,
                with: Instruction::assign(temp("t1"), Operand::Int(6), 1),
            },
        };
        // Mul (4) becomes Assign (1), outside any loop.
        assert_eq!(StaticCostPolicy.score(&rewrite, &code, &analysis), 3);
    }

    #[test]
    fn test_loop_depth_multiplies_score() {
        let code = vec![
            Instruction::label("L1", 1),
            Instruction::binary(Opcode::Mul, temp("t1"), var("a"), var("b"), 1),
            Instruction::goto("L1", 1),
        ];
        let analysis = Analysis::of(&code);
        let rewrite = Rewrite {
            pass: "dead_code",
            description: String::new(),
            action: Action::Remove { index: 1 },
        };
        // Mul (4) plus two operand fetches, at depth 1: weight 10.
        assert_eq!(StaticCostPolicy.score(&rewrite, &code, &analysis), 60);
    }

    #[test]
    fn test_hoist_scores_depth_difference() {
        let code = vec![
            Instruction::label("L1", 1),
            Instruction::binary(Opcode::Mul, temp("t1"), var("a"), var("b"), 1),
            Instruction::goto("L1", 1),
        ];
        let analysis = Analysis::of(&code);
        let rewrite = Rewrite {
            pass: "loop_invariant",
            description: String::new(),
            action: Action::Hoist {
                index: 1,
                before: 0,
            },
        };
        // Mul (4) plus two operand fetches, weight drops from 10 to 1.
        assert_eq!(StaticCostPolicy.score(&rewrite, &code, &analysis), 54);
    }
}
