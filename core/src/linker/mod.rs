//! Links compiled modules into one [`Program`].
//!
//! Linking flattens every module's functions and constants into a single
//! global address space, orders constant initializers so each one runs
//! after the constants it reaches (directly or through functions and
//! closures it references), and rewrites every `GLOBAL`/`ARRAY` operand
//! from a per-body dependency index to its final address.

mod error;
mod program;
mod topo;

#[cfg(test)]
mod linker_test;

pub use error::LinkError;
pub use program::{Callable, Constant, Program, ProgramMetadata};

use alloc::collections::BTreeMap;

use hashbrown::HashSet;
use tracing::{debug, trace};

use crate::{
    String, ToString, Vec,
    compiler::{
        BodyNode, CompiledFunction, CompiledModule, ConstantEntry, ConstantKey, Dependency,
        FuncNode, Function, FunctionKey,
    },
    values::Literal,
    vec,
    vm::{Limit, OpCode},
};

/// Names of the external schemas `DES`/`SER` operands refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaTable {
    names: Vec<String>,
}

impl SchemaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names(names: &[&str]) -> Self {
        let mut table = Self::new();
        for name in names {
            table.register(name);
        }
        table
    }

    /// Index of `name`, registering it if needed.
    pub fn register(&mut self, name: &str) -> u32 {
        match self.names.iter().position(|n| n == name) {
            Some(index) => index as u32,
            None => {
                self.names.push(String::from(name));
                (self.names.len() - 1) as u32
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A function or closure whose dependencies may lead to constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeRef {
    Function(usize),
    Closure(usize),
}

/// Final addresses of everything a dependency can name.
struct Layout {
    data: usize,
    functions: BTreeMap<FunctionKey, usize>,
    functions_base: usize,
    closures: usize,
    closures_base: usize,
    /// Constant addresses, already in evaluation order.
    constants: BTreeMap<ConstantKey, usize>,
    schemas: usize,
}

impl Layout {
    fn resolve(&self, dep: &Dependency, from: &str) -> Result<usize, LinkError> {
        match dep {
            Dependency::Function(key) => self
                .functions
                .get(key)
                .map(|index| self.functions_base + index)
                .ok_or_else(|| LinkError::UnresolvedFunction {
                    key: key.clone(),
                    from: String::from(from),
                }),
            Dependency::Constant(key) => {
                self.constants
                    .get(key)
                    .copied()
                    .ok_or_else(|| LinkError::UnresolvedConstant {
                        key: key.clone(),
                        from: String::from(from),
                    })
            }
            Dependency::Data(index) => {
                let index = *index as usize;
                if index < self.data {
                    Ok(index)
                } else {
                    Err(invalid("data", index, from))
                }
            }
            Dependency::Closure(index) => {
                let index = *index as usize;
                if index < self.closures {
                    Ok(self.closures_base + index)
                } else {
                    Err(invalid("closure", index, from))
                }
            }
        }
    }

    /// Rewrites global operands from dependency indexes to addresses.
    fn relocate(
        &self,
        function: &mut CompiledFunction,
        deps: &[Dependency],
    ) -> Result<(), LinkError> {
        let from = function.info.display_name();
        for instruction in function.code.instructions_mut() {
            match instruction.op() {
                OpCode::Global | OpCode::Array => {
                    let index = instruction.wide();
                    let dep = deps
                        .get(index)
                        .ok_or_else(|| invalid("global", index, &from))?;
                    let address = self.resolve(dep, &from)?;
                    *instruction = instruction.with_wide(address)?;
                }
                OpCode::Des | OpCode::Ser => {
                    let index = instruction.wide();
                    if index >= self.schemas {
                        return Err(LinkError::UnknownSchema { index, from });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn invalid(kind: &'static str, index: usize, from: &str) -> LinkError {
    LinkError::InvalidDependency {
        kind,
        index,
        from: String::from(from),
    }
}

/// Links `modules` (with the data and closure pools their dependencies
/// index) into a program.
pub fn create_program(
    metadata: ProgramMetadata,
    modules: Vec<CompiledModule>,
    data: Vec<Literal>,
    closures: Vec<BodyNode>,
    schemas: &SchemaTable,
) -> Result<Program, LinkError> {
    let mut functions: Vec<(FunctionKey, FuncNode)> = Vec::new();
    let mut constants: Vec<ConstantEntry> = Vec::new();
    let mut effects: Vec<BodyNode> = Vec::new();
    for module in modules {
        functions.extend(
            module
                .functions
                .into_iter()
                .map(|entry| (entry.key, entry.node)),
        );
        constants.extend(module.constants);
        effects.extend(module.effects);
    }

    let function_index: BTreeMap<FunctionKey, usize> = functions
        .iter()
        .enumerate()
        .map(|(i, (key, _))| (key.clone(), i))
        .collect();
    let constant_index: BTreeMap<ConstantKey, usize> = constants
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.key.clone(), i))
        .collect();

    let order = constant_order(
        &functions,
        &function_index,
        &closures,
        &constants,
        &constant_index,
    )?;

    let functions_base = data.len();
    let closures_base = functions_base + functions.len();
    let constants_base = closures_base + closures.len();
    Limit::Globals.check(constants_base + constants.len())?;

    let mut constant_addresses = BTreeMap::new();
    for (rank, &index) in order.iter().enumerate() {
        constant_addresses.insert(constants[index].key.clone(), constants_base + rank);
    }
    let layout = Layout {
        data: data.len(),
        functions: function_index,
        functions_base,
        closures: closures.len(),
        closures_base,
        constants: constant_addresses,
        schemas: schemas.len(),
    };

    let mut linked_functions = Vec::with_capacity(functions.len());
    let mut symbols = BTreeMap::new();
    for (i, (key, node)) in functions.into_iter().enumerate() {
        let function = match node.function {
            Function::Compiled(mut function) => {
                layout.relocate(&mut function, &node.deps)?;
                Function::Compiled(function)
            }
            native => native,
        };
        symbols.insert(key, (functions_base + i) as u32);
        linked_functions.push(function);
    }

    let mut linked_closures = Vec::with_capacity(closures.len());
    for BodyNode { mut function, deps } in closures {
        layout.relocate(&mut function, &deps)?;
        linked_closures.push(function);
    }

    let mut slots: Vec<Option<ConstantEntry>> = constants.into_iter().map(Some).collect();
    let mut linked_constants = Vec::with_capacity(slots.len());
    let mut constant_symbols = BTreeMap::new();
    for (rank, &index) in order.iter().enumerate() {
        let Some(entry) = slots[index].take() else {
            continue;
        };
        let ConstantEntry { key, span, node } = entry;
        let BodyNode { mut function, deps } = node;
        layout.relocate(&mut function, &deps)?;
        trace!(constant = %key, address = constants_base + rank, "Placed constant");
        constant_symbols.insert(key.clone(), (constants_base + rank) as u32);
        linked_constants.push(Constant {
            key,
            span,
            initializer: function,
        });
    }

    let mut linked_effects = Vec::with_capacity(effects.len());
    for BodyNode { mut function, deps } in effects {
        layout.relocate(&mut function, &deps)?;
        linked_effects.push(function);
    }

    let program = Program {
        metadata,
        data,
        functions: linked_functions,
        closures: linked_closures,
        constants: linked_constants,
        effects: linked_effects,
        schemas: schemas.names.clone(),
        symbols,
        constant_symbols,
    };
    debug!(
        program = %program.metadata.name,
        globals = program.global_count(),
        functions = program.functions.len(),
        closures = program.closures.len(),
        constants = program.constants.len(),
        effects = program.effects.len(),
        "Linked program"
    );
    Ok(program)
}

/// Flattened constant indexes in evaluation order.
fn constant_order(
    functions: &[(FunctionKey, FuncNode)],
    function_index: &BTreeMap<FunctionKey, usize>,
    closures: &[BodyNode],
    constants: &[ConstantEntry],
    constant_index: &BTreeMap<ConstantKey, usize>,
) -> Result<Vec<usize>, LinkError> {
    let mut edges = Vec::with_capacity(constants.len());
    for entry in constants {
        let from = entry.key.to_string();
        let mut reached = Vec::new();
        let mut visited = HashSet::new();
        let mut pending: Vec<&[Dependency]> = vec![entry.node.deps.as_slice()];
        while let Some(deps) = pending.pop() {
            for dep in deps {
                match dep {
                    Dependency::Constant(key) => {
                        let index = constant_index.get(key).copied().ok_or_else(|| {
                            LinkError::UnresolvedConstant {
                                key: key.clone(),
                                from: from.clone(),
                            }
                        })?;
                        reached.push(index);
                    }
                    Dependency::Function(key) => {
                        let index = function_index.get(key).copied().ok_or_else(|| {
                            LinkError::UnresolvedFunction {
                                key: key.clone(),
                                from: from.clone(),
                            }
                        })?;
                        if visited.insert(NodeRef::Function(index)) {
                            pending.push(&functions[index].1.deps);
                        }
                    }
                    Dependency::Closure(index) => {
                        let index = *index as usize;
                        let closure = closures
                            .get(index)
                            .ok_or_else(|| invalid("closure", index, &from))?;
                        if visited.insert(NodeRef::Closure(index)) {
                            pending.push(&closure.deps);
                        }
                    }
                    Dependency::Data(_) => {}
                }
            }
        }
        reached.sort_unstable();
        reached.dedup();
        edges.push(reached);
    }

    topo::sort(constants.len(), &edges).map_err(|stuck| LinkError::CircularConstants {
        names: stuck
            .iter()
            .map(|&index| constants[index].key.to_string())
            .collect(),
        span: stuck
            .first()
            .map(|&index| constants[index].span.clone())
            .unwrap_or_default(),
    })
}
