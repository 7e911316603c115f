use crate::ir::{Instruction, Opcode};
use std::collections::{HashMap, HashSet};

/// A natural loop found in the instruction list
///
/// `start` is the index of the loop's entry label, `end` the index of the
/// backward GOTO that closes it. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loop {
    pub start: usize,
    pub end: usize,
}

impl Loop {
    /// True when the instruction index lies inside the loop body
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

/// Dataflow facts shared by all optimization passes
///
/// Recomputed from scratch after every applied rewrite; the lists are small
/// enough that incrementality would not pay for itself.
pub struct Analysis {
    /// Loops, identified by backward jumps
    pub loops: Vec<Loop>,
    /// Loop nesting depth per instruction
    pub loop_depth: Vec<usize>,
    /// Names live on entry to each instruction
    pub live_in: Vec<HashSet<String>>,
    /// Names live on exit from each instruction
    pub live_out: Vec<HashSet<String>>,
    /// Label name to instruction index
    pub label_index: HashMap<String, usize>,
}

impl Analysis {
    pub fn of(code: &[Instruction]) -> Self {
        let label_index = index_labels(code);
        let loops = find_loops(code, &label_index);
        let loop_depth = depth_per_instruction(code.len(), &loops);
        let crossing = cross_region_names(code);
        let (live_in, live_out) = liveness(code, &label_index, &crossing);

        Analysis {
            loops,
            loop_depth,
            live_in,
            live_out,
            label_index,
        }
    }

    /// The innermost loop containing the instruction, if any
    pub fn innermost_loop(&self, index: usize) -> Option<Loop> {
        self.loops
            .iter()
            .filter(|l| l.contains(index))
            .min_by_key(|l| l.end - l.start)
            .copied()
    }
}

fn index_labels(code: &[Instruction]) -> HashMap<String, usize> {
    code.iter()
        .enumerate()
        .filter_map(|(i, instr)| instr.label_name().map(|name| (name.to_string(), i)))
        .collect()
}

/// Loops are backward jumps: a GOTO whose target label precedes it
fn find_loops(code: &[Instruction], labels: &HashMap<String, usize>) -> Vec<Loop> {
    let mut loops = Vec::new();
    for (i, instr) in code.iter().enumerate() {
        if instr.op != Opcode::Goto {
            continue;
        }
        if let Some(target) = instr.jump_target() {
            if let Some(&start) = labels.get(target) {
                if start <= i {
                    loops.push(Loop { start, end: i });
                }
            }
        }
    }
    loops
}

fn depth_per_instruction(len: usize, loops: &[Loop]) -> Vec<usize> {
    let mut depth = vec![0usize; len];
    for l in loops {
        for d in depth.iter_mut().take(l.end + 1).skip(l.start) {
            *d += 1;
        }
    }
    depth
}

/// Control-flow successors of an instruction
fn successors(code: &[Instruction], labels: &HashMap<String, usize>, i: usize) -> Vec<usize> {
    let instr = &code[i];
    match instr.op {
        Opcode::Goto => instr
            .jump_target()
            .and_then(|t| labels.get(t))
            .map(|&j| vec![j])
            .unwrap_or_default(),
        Opcode::IfFalse => {
            let mut next = Vec::new();
            if i + 1 < code.len() {
                next.push(i + 1);
            }
            if let Some(&j) = instr.jump_target().and_then(|t| labels.get(t)) {
                next.push(j);
            }
            next
        }
        Opcode::Return => Vec::new(),
        _ => {
            if i + 1 < code.len() {
                vec![i + 1]
            } else {
                Vec::new()
            }
        }
    }
}

/// Names that cross a function boundary
///
/// Function bodies are lowered ahead of the main program, and the flat
/// instruction list carries no explicit call edges. Any name that appears
/// in more than one region (each FUNC..ENDFUNC body, or the main program)
/// may be read or written through a call, so liveness must never treat a
/// definition of such a name as dead at a call boundary.
fn cross_region_names(code: &[Instruction]) -> HashSet<String> {
    let mut current = 0usize;
    let mut next_region = 1usize;
    let mut first_region: HashMap<&str, usize> = HashMap::new();
    let mut crossing = HashSet::new();

    for instr in code {
        match instr.op {
            Opcode::Func => {
                current = next_region;
                next_region += 1;
            }
            Opcode::EndFunc => current = 0,
            _ => {}
        }

        let mut names = instr.uses();
        if let Some(def) = instr.defined() {
            names.push(def);
        }
        for name in names {
            match first_region.get(name) {
                Some(&region) if region != current => {
                    crossing.insert(name.to_string());
                }
                Some(_) => {}
                None => {
                    first_region.insert(name, current);
                }
            }
        }
    }
    crossing
}

/// Backward liveness to a fixed point
///
/// CALL, RETURN, and ENDFUNC count as reading every boundary-crossing name,
/// standing in for the call edges the instruction list does not have.
fn liveness(
    code: &[Instruction],
    labels: &HashMap<String, usize>,
    crossing: &HashSet<String>,
) -> (Vec<HashSet<String>>, Vec<HashSet<String>>) {
    let len = code.len();
    let mut live_in: Vec<HashSet<String>> = vec![HashSet::new(); len];
    let mut live_out: Vec<HashSet<String>> = vec![HashSet::new(); len];

    let mut changed = true;
    while changed {
        changed = false;
        for i in (0..len).rev() {
            let mut out = HashSet::new();
            for succ in successors(code, labels, i) {
                out.extend(live_in[succ].iter().cloned());
            }

            let mut inn: HashSet<String> = out.clone();
            if let Some(def) = code[i].defined() {
                inn.remove(def);
            }
            for used in code[i].uses() {
                inn.insert(used.to_string());
            }
            if matches!(
                code[i].op,
                Opcode::Call | Opcode::Return | Opcode::EndFunc
            ) {
                inn.extend(crossing.iter().cloned());
            }

            if out != live_out[i] || inn != live_in[i] {
                live_out[i] = out;
                live_in[i] = inn;
                changed = true;
            }
        }
    }

    (live_in, live_out)
}
