//! TAC optimization: a pass library driven by a scoring policy
//!
//! Passes only propose rewrites; a [`ScoringPolicy`] ranks them and the
//! driver greedily applies the best one, recomputes the analysis, and
//! repeats until nothing scores positive or the iteration cap is hit.

mod analysis;
mod passes;
mod policy;

pub use analysis::{Analysis, Loop};
pub use passes::{
    Action, CommonSubexpression, ConstantFolding, DeadCode, LoopInvariant, Pass, Rewrite,
    StrengthReduction,
};
pub use policy::{instruction_cost, ScoringPolicy, StaticCostPolicy};

use crate::ir::Instruction;
use lazy_static::lazy_static;
use std::fmt;

lazy_static! {
    /// All passes, in tie-break priority order
    static ref PASS_LIBRARY: Vec<Box<dyn Pass>> = vec![
        Box::new(ConstantFolding),
        Box::new(StrengthReduction),
        Box::new(CommonSubexpression),
        Box::new(LoopInvariant),
        Box::new(DeadCode),
    ];
}

/// Hard cap on applied rewrites per program
///
/// Every applied rewrite strictly lowers estimated cost, so termination
/// does not depend on this, but a misbehaving custom policy should not be
/// able to spin forever.
const MAX_ITERATIONS: usize = 128;

/// One applied rewrite, for the optimization report
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRecord {
    /// Pass that proposed the rewrite
    pub pass: String,
    /// What changed, in TAC text form
    pub description: String,
    /// Score the policy assigned
    pub score: i64,
}

impl fmt::Display for OptimizationRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {} (score {})", self.pass, self.description, self.score)
    }
}

/// Greedy rewrite selector over the pass library
pub struct Optimizer {
    policy: Box<dyn ScoringPolicy>,
    max_iterations: usize,
}

impl Optimizer {
    /// Creates an optimizer with the default static-cost policy
    pub fn new() -> Self {
        Self::with_policy(Box::new(StaticCostPolicy))
    }

    /// Creates an optimizer driven by a custom policy
    pub fn with_policy(policy: Box<dyn ScoringPolicy>) -> Self {
        Optimizer {
            policy,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Optimizes the code to a fixed point, returning it with the log
    pub fn optimize(&self, code: Vec<Instruction>) -> (Vec<Instruction>, Vec<OptimizationRecord>) {
        let mut code = code;
        let mut records = Vec::new();

        for iteration in 0..self.max_iterations {
            let analysis = Analysis::of(&code);

            let mut scored: Vec<(i64, Rewrite)> = Vec::new();
            for pass in PASS_LIBRARY.iter() {
                for rewrite in pass.candidates(&code, &analysis) {
                    let score = self.policy.score(&rewrite, &code, &analysis);
                    if score > 0 {
                        scored.push((score, rewrite));
                    }
                }
            }
            // Highest score first; equal scores go to the earliest position,
            // and the stable sort leaves library order as the final tie-break.
            scored.sort_by(|(sa, ra), (sb, rb)| {
                sb.cmp(sa).then_with(|| ra.position().cmp(&rb.position()))
            });

            let mut applied = false;
            for (score, rewrite) in scored {
                let next = rewrite.apply(&code);
                if !preserves_effects(&code, &next) {
                    tracing::warn!(
                        pass = rewrite.pass,
                        rewrite = %rewrite.description,
                        "rewrite would alter side effects, discarded"
                    );
                    continue;
                }
                tracing::debug!(
                    iteration,
                    pass = rewrite.pass,
                    score,
                    rewrite = %rewrite.description,
                    "applied rewrite"
                );
                records.push(OptimizationRecord {
                    pass: rewrite.pass.to_string(),
                    description: rewrite.description.clone(),
                    score,
                });
                code = next;
                applied = true;
                break;
            }

            if !applied {
                return (code, records);
            }
        }

        tracing::warn!(max_iterations = self.max_iterations, "iteration cap reached");
        (code, records)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrites must keep the multiset of observable instructions intact
///
/// Prints, scans, calls, returns, and the control skeleton are what the
/// program does; a pass may reorder computation around them, never change
/// them. The sort makes the comparison order-insensitive, which is what
/// hoisting needs.
fn preserves_effects(before: &[Instruction], after: &[Instruction]) -> bool {
    let mut effects_before: Vec<String> = before
        .iter()
        .filter(|i| i.has_side_effect())
        .map(|i| i.to_string())
        .collect();
    let mut effects_after: Vec<String> = after
        .iter()
        .filter(|i| i.has_side_effect())
        .map(|i| i.to_string())
        .collect();
    effects_before.sort();
    effects_after.sort();
    effects_before == effects_after
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Opcode, Operand};

    fn temp(n: &str) -> Operand {
        Operand::Temp(n.to_string())
    }

    fn var(n: &str) -> Operand {
        Operand::Var(n.to_string())
    }

    fn lines(code: &[Instruction]) -> Vec<String> {
        code.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_fold_then_propagate_to_fixed_point() {
        // t1 = 2 + 3; x = t1; PRINT x
        let code = vec![
            Instruction::binary(Opcode::Add, temp("t1"), Operand::Int(2), Operand::Int(3), 1),
            Instruction::assign(var("x"), temp("t1"), 1),
            Instruction::print(var("x"), 1),
        ];
        let (optimized, records) = Optimizer::new().optimize(code);
        // Fold, propagate the constant into the copy, then drop the temp.
        assert_eq!(records.len(), 3);
        assert_eq!(lines(&optimized), vec!["x = 5", "PRINT x"]);
    }

    #[test]
    fn test_dead_code_removed() {
        let code = vec![
            Instruction::binary(Opcode::Mul, temp("t1"), var("a"), var("b"), 1),
            Instruction::print(var("a"), 1),
        ];
        let (optimized, records) = Optimizer::new().optimize(code);
        assert_eq!(lines(&optimized), vec!["PRINT a"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pass, "dead_code");
    }

    #[test]
    fn test_prints_always_survive() {
        let code = vec![
            Instruction::print(Operand::Int(1), 1),
            Instruction::print(Operand::Int(2), 1),
        ];
        let (optimized, records) = Optimizer::new().optimize(code.clone());
        assert_eq!(optimized, code);
        assert!(records.is_empty());
    }

    #[test]
    fn test_optimization_is_idempotent() {
        let code = vec![
            Instruction::binary(Opcode::Add, temp("t1"), Operand::Int(2), Operand::Int(3), 1),
            Instruction::print(temp("t1"), 1),
        ];
        let (once, _) = Optimizer::new().optimize(code);
        let (twice, records) = Optimizer::new().optimize(once.clone());
        assert_eq!(once, twice);
        assert!(records.is_empty());
    }

    #[test]
    fn test_records_describe_each_step() {
        let code = vec![
            Instruction::binary(Opcode::Mul, temp("t1"), var("x"), Operand::Int(2), 1),
            Instruction::print(temp("t1"), 1),
        ];
        let (_, records) = Optimizer::new().optimize(code);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pass, "strength_reduction");
        assert!(records[0].description.contains("t1 = x + x"));
        assert!(records[0].score > 0);
    }

    #[test]
    fn test_global_read_by_function_survives() {
        // g has no read in the main program, only through the call.
        let code = vec![
            Instruction::func("f", 1),
            Instruction::ret(Some(var("g")), 1),
            Instruction::end_func(1),
            Instruction::assign(var("g"), Operand::Int(5), 2),
            Instruction::call(temp("t1"), "f", 0, 3),
            Instruction::print(temp("t1"), 3),
        ];
        let (optimized, _) = Optimizer::new().optimize(code);
        assert!(lines(&optimized).contains(&"g = 5".to_string()));
    }

    #[test]
    fn test_global_write_by_function_survives() {
        let code = vec![
            Instruction::func("f", 1),
            Instruction::assign(var("g"), Operand::Int(10), 1),
            Instruction::ret(Some(Operand::Int(0)), 1),
            Instruction::end_func(1),
            Instruction::assign(var("g"), Operand::Int(5), 2),
            Instruction::call(temp("t1"), "f", 0, 3),
            Instruction::print(var("g"), 3),
        ];
        let (optimized, _) = Optimizer::new().optimize(code);
        let text = lines(&optimized);
        assert!(text.contains(&"g = 10".to_string()));
        assert!(text.contains(&"g = 5".to_string()));
    }

    /// Policy that scores everything the same, exercising tie-breaking
    struct FlatPolicy;

    impl ScoringPolicy for FlatPolicy {
        fn name(&self) -> &'static str {
            "flat"
        }

        fn score(&self, _: &Rewrite, _: &[Instruction], _: &Analysis) -> i64 {
            1
        }
    }

    #[test]
    fn test_custom_policy_terminates() {
        let code = vec![
            Instruction::binary(Opcode::Add, temp("t1"), Operand::Int(1), Operand::Int(1), 1),
            Instruction::print(temp("t1"), 1),
        ];
        let (optimized, _) = Optimizer::with_policy(Box::new(FlatPolicy)).optimize(code);
        assert!(lines(&optimized).contains(&"PRINT t1".to_string()));
    }
}
