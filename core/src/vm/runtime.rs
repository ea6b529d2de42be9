use bumpalo::Bump;
use tracing::{debug, error, trace};

use super::{
    Code, ExecutionError, ExecutionErrorKind, Limit, OpCode, SchemaCodec, Stack, TraceFrame,
    context::{ContextPool, ExecutionContext, Frame},
};
use crate::{
    Vec,
    api::ExecutionOptions,
    compiler::CompiledFunction,
    format,
    linker::{Callable, Program},
    natives::NativeRegistry,
    values::{Closure, Value},
};

/// A compiled body ready to be entered, with what goes in its context block.
#[derive(Clone, Copy)]
struct Callee<'p, 'a> {
    function: &'p CompiledFunction,
    context: &'a [Value<'a>],
    /// Occupies the last context slot of a self-recursive closure.
    itself: Option<Value<'a>>,
}

enum Target<'p, 'a> {
    Native(u32),
    Compiled(Callee<'p, 'a>),
}

/// Executes a linked [`Program`].
///
/// Building a `Vm` materializes the global slots and evaluates every
/// constant in link order. After that, globals are read-only and any number
/// of calls can be made, including from natives re-entering through the
/// `&mut Vm` they receive.
pub struct Vm<'p, 'a> {
    program: &'p Program,
    registry: &'p NativeRegistry,
    arena: &'a Bump,
    options: ExecutionOptions,
    globals: Vec<Value<'a>>,
    pool: ContextPool<'p, 'a>,
    codec: Option<&'p dyn SchemaCodec>,
    /// Frames live in contexts waiting on a native call, counted against
    /// `max_frames` by re-entrant calls.
    suspended: usize,
    peak_frames: usize,
}

impl<'p, 'a> Vm<'p, 'a> {
    pub fn new(
        program: &'p Program,
        registry: &'p NativeRegistry,
        arena: &'a Bump,
    ) -> Result<Self, ExecutionError> {
        Self::build(program, registry, arena, ExecutionOptions::default(), None)
    }

    pub fn with_options(
        program: &'p Program,
        registry: &'p NativeRegistry,
        arena: &'a Bump,
        options: ExecutionOptions,
    ) -> Result<Self, ExecutionError> {
        Self::build(program, registry, arena, options, None)
    }

    /// Like [`with_options`](Self::with_options), with a codec for
    /// `DES`/`SER`. Constants may already decode through it.
    pub fn with_codec(
        program: &'p Program,
        registry: &'p NativeRegistry,
        arena: &'a Bump,
        options: ExecutionOptions,
        codec: &'p dyn SchemaCodec,
    ) -> Result<Self, ExecutionError> {
        Self::build(program, registry, arena, options, Some(codec))
    }

    fn build(
        program: &'p Program,
        registry: &'p NativeRegistry,
        arena: &'a Bump,
        options: ExecutionOptions,
        codec: Option<&'p dyn SchemaCodec>,
    ) -> Result<Self, ExecutionError> {
        let mut globals = Vec::with_capacity(program.global_count());
        globals.extend(
            program
                .data
                .iter()
                .map(|literal| Value::from_literal(arena, literal)),
        );
        globals.extend(
            (program.functions_base()..program.constants_base())
                .map(|address| Value::Function(address as u32)),
        );
        globals.resize(program.global_count(), Value::Nil);

        let pool = ContextPool::new(options.pool_size, options.initial_stack);
        let mut vm = Self {
            program,
            registry,
            arena,
            options,
            globals,
            pool,
            codec,
            suspended: 0,
            peak_frames: 0,
        };
        vm.initialize_constants()?;
        debug!(
            program = %program.metadata.name,
            globals = vm.globals.len(),
            constants = program.constants.len(),
            "VM ready"
        );
        Ok(vm)
    }

    fn initialize_constants(&mut self) -> Result<(), ExecutionError> {
        let program = self.program;
        let base = program.constants_base();
        for (i, constant) in program.constants.iter().enumerate() {
            let value = self.run_body(&constant.initializer, Value::Nil)?;
            trace!(constant = %constant.key, %value, "Evaluated constant");
            self.globals[base + i] = value;
        }
        Ok(())
    }

    pub fn arena(&self) -> &'a Bump {
        self.arena
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn registry(&self) -> &'p NativeRegistry {
        self.registry
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Largest number of simultaneously live frames seen by any call so far.
    pub fn peak_frames(&self) -> usize {
        self.peak_frames
    }

    pub fn reset_peak_frames(&mut self) {
        self.peak_frames = 0;
    }

    /// Execution contexts currently idle on the free list.
    pub fn pooled_contexts(&self) -> usize {
        self.pool.available()
    }

    pub fn global(&self, address: usize) -> Option<Value<'a>> {
        self.globals.get(address).copied()
    }

    pub fn function(&self, module: &str, name: &str, overload: u32) -> Option<Value<'a>> {
        self.program
            .function_address(module, name, overload)
            .and_then(|address| self.global(address))
    }

    pub fn constant(&self, module: &str, name: &str) -> Option<Value<'a>> {
        self.program
            .constant_address(module, name)
            .and_then(|address| self.global(address))
    }

    /// Invokes a function or closure value.
    pub fn call(
        &mut self,
        function: Value<'a>,
        argument: Value<'a>,
    ) -> Result<Value<'a>, ExecutionError> {
        match self.resolve(function)? {
            Target::Native(id) => self.call_native(id, argument),
            Target::Compiled(callee) => self.run(callee, argument),
        }
    }

    pub fn effect_count(&self) -> usize {
        self.program.effects.len()
    }

    /// Runs the effect body at `index` with a nil argument.
    pub fn run_effect(&mut self, index: usize) -> Result<Value<'a>, ExecutionError> {
        let program = self.program;
        let effect = program
            .effects
            .get(index)
            .ok_or(ExecutionErrorKind::InvalidAddress { address: index })?;
        self.run_body(effect, Value::Nil)
    }

    fn run_body(
        &mut self,
        function: &'p CompiledFunction,
        argument: Value<'a>,
    ) -> Result<Value<'a>, ExecutionError> {
        let callee = Callee {
            function,
            context: &[],
            itself: None,
        };
        self.run(callee, argument)
    }

    fn resolve(&self, value: Value<'a>) -> Result<Target<'p, 'a>, ExecutionErrorKind> {
        let (address, context, itself) = match value {
            Value::Function(address) => (address, &[] as &'a [Value<'a>], None),
            Value::Closure(closure) => (
                closure.function,
                closure.context,
                closure.recursive.then_some(value),
            ),
            other => return Err(ExecutionErrorKind::NotCallable { found: other.kind() }),
        };
        let program = self.program;
        match program.callable(address as usize) {
            Some(Callable::Native(id)) => Ok(Target::Native(id)),
            Some(Callable::Compiled(function)) => {
                let provided = context.len() + itself.is_some() as usize;
                if provided != function.size.context as usize {
                    // A closure template reached CALL without going through CTX.
                    return Err(ExecutionErrorKind::NotCallable {
                        found: "closure template",
                    });
                }
                Ok(Target::Compiled(Callee {
                    function,
                    context,
                    itself,
                }))
            }
            None => Err(ExecutionErrorKind::InvalidAddress {
                address: address as usize,
            }),
        }
    }

    fn call_native(&mut self, id: u32, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
        let native = self
            .registry
            .function(id)
            .ok_or(ExecutionErrorKind::NotCallable { found: "native" })?;
        native(self, argument)
    }

    fn run(&mut self, callee: Callee<'p, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
        let depth = self.suspended + 1;
        if depth > self.options.max_frames {
            return Err(ExecutionErrorKind::ResourceExceeded {
                depth,
                max_frames: self.options.max_frames,
            }
            .into());
        }
        let mut context = self.pool.acquire();
        let mut frame = enter(&mut context.stack, callee, argument);
        self.peak_frames = self.peak_frames.max(depth);
        let result = self.execute(&mut context, &mut frame);
        let result = result.map_err(|mut err| {
            unwind(&context, &frame, &mut err);
            err
        });
        self.pool.release(context);
        result
    }

    fn global_at(&self, address: usize) -> Result<Value<'a>, ExecutionErrorKind> {
        self.global(address)
            .ok_or(ExecutionErrorKind::InvalidAddress { address })
    }

    fn execute(
        &mut self,
        context: &mut ExecutionContext<'p, 'a>,
        frame: &mut Frame<'p>,
    ) -> Result<Value<'a>, ExecutionError> {
        let arena = self.arena;
        loop {
            let function = frame.function;
            let Some(instruction) = function.code.get(frame.ip) else {
                let result = pop(&mut context.stack, "return")?;
                context.stack.truncate(frame.base);
                match context.frames.pop() {
                    Some(caller) => {
                        context.stack.push(result);
                        *frame = caller;
                        continue;
                    }
                    None => return Ok(result),
                }
            };
            frame.ip += 1;

            let op = instruction.op();
            let name = op.mnemonic();
            let stack = &mut context.stack;
            match op {
                OpCode::Nop => {}
                OpCode::Nil => stack.push(Value::Nil),
                OpCode::Pop => {
                    pop(stack, name)?;
                }
                OpCode::Global => {
                    let value = self.global_at(instruction.wide())?;
                    stack.push(value);
                }
                OpCode::Load => {
                    let slot = local_slot(frame, instruction.offset())?;
                    let value = *stack.get(slot).ok_or(ExecutionErrorKind::InvalidLocal {
                        offset: instruction.offset(),
                    })?;
                    stack.push(value);
                }
                OpCode::Store => {
                    let slot = local_slot(frame, instruction.offset())?;
                    let value = pop(stack, name)?;
                    let target = stack.get_mut(slot).ok_or(ExecutionErrorKind::InvalidLocal {
                        offset: instruction.offset(),
                    })?;
                    *target = value;
                }
                OpCode::Sum => {
                    let payload = pop(stack, name)?;
                    stack.push(Value::sum(arena, instruction.arg0(), payload));
                }
                OpCode::Jif => {
                    let top = stack
                        .peek_mut()
                        .ok_or(ExecutionErrorKind::StackUnderflow { opcode: name })?;
                    match *top {
                        Value::Sum(tag, payload) => {
                            if tag == instruction.arg0() {
                                *top = *payload;
                                frame.ip = instruction.dest();
                            }
                        }
                        other => return Err(mismatch(name, "sum", other).into()),
                    }
                }
                OpCode::Jmp => frame.ip = instruction.dest(),
                OpCode::Prod => {
                    let count = instruction.arg0() as usize;
                    let elements = stack
                        .top_n(count)
                        .ok_or(ExecutionErrorKind::StackUnderflow { opcode: name })?;
                    let tuple = Value::tuple(arena, elements);
                    stack.truncate(stack.len() - count);
                    stack.push(tuple);
                }
                OpCode::Get => {
                    let tuple = *stack
                        .peek()
                        .ok_or(ExecutionErrorKind::StackUnderflow { opcode: name })?;
                    let value = component(tuple, instruction.arg0(), name)?;
                    stack.push(value);
                }
                OpCode::PopGet => {
                    let tuple = pop(stack, name)?;
                    stack.push(component(tuple, instruction.arg0(), name)?);
                }
                OpCode::Set => {
                    let value = pop(stack, name)?;
                    let tuple = pop(stack, name)?;
                    let elements = tuple_elements(tuple, name)?;
                    let index = instruction.arg0() as usize;
                    if index >= elements.len() {
                        return Err(ExecutionErrorKind::ComponentOutOfRange {
                            index,
                            len: elements.len(),
                        }
                        .into());
                    }
                    let updated = arena.alloc_slice_copy(elements);
                    updated[index] = value;
                    stack.push(Value::Tuple(updated));
                }
                OpCode::Ctx => {
                    let captured = pop(stack, name)?;
                    let captured = tuple_elements(captured, name)?;
                    let function = match pop(stack, name)? {
                        Value::Function(address) => address,
                        other => return Err(mismatch(name, "function", other).into()),
                    };
                    let closure = arena.alloc(Closure {
                        function,
                        context: captured,
                        recursive: instruction.arg0() != 0,
                    });
                    stack.push(Value::Closure(closure));
                }
                OpCode::Call => {
                    let callee = pop(stack, name)?;
                    match self.resolve(callee)? {
                        Target::Native(id) => {
                            let argument = pop(stack, name)?;
                            let live = context.frames.len() + 1;
                            self.suspended += live;
                            let result = self.call_native(id, argument);
                            self.suspended -= live;
                            context.stack.push(result?);
                        }
                        Target::Compiled(callee) => {
                            let argument = pop(stack, name)?;
                            if is_tail_position(&function.code, frame.ip) {
                                context.stack.truncate(frame.base);
                            } else {
                                let depth = self.suspended + context.frames.len() + 2;
                                if depth > self.options.max_frames {
                                    return Err(ExecutionErrorKind::ResourceExceeded {
                                        depth,
                                        max_frames: self.options.max_frames,
                                    }
                                    .into());
                                }
                                context.frames.push(*frame);
                            }
                            *frame = enter(&mut context.stack, callee, argument);
                            self.peak_frames = self
                                .peak_frames
                                .max(self.suspended + context.frames.len() + 1);
                        }
                    }
                }
                OpCode::Array => {
                    let value = self.global_at(instruction.wide())?;
                    let Value::Int(hint) = value else {
                        return Err(mismatch(name, "int", value).into());
                    };
                    // The hint sizes the first allocation; more elements grow it.
                    let capacity = usize::try_from(hint)
                        .map_or(0, |hint| hint.min(Limit::ArraySize.capacity()));
                    let slot = context.stack.len();
                    context.open_array(slot, capacity, arena);
                    context.stack.push(Value::Array(&[]));
                }
                OpCode::Append => {
                    let value = pop(stack, name)?;
                    let array = pop(stack, name)?;
                    let elements = array.as_array().ok_or(mismatch(name, "array", array))?;
                    let slot = context.stack.len();
                    let result = match context.array_at(slot) {
                        Some(builder) => {
                            builder.elements.push(value);
                            if instruction.closes_array() {
                                context
                                    .arrays
                                    .pop()
                                    .map_or(array, |built| {
                                        Value::Array(built.elements.into_bump_slice())
                                    })
                            } else {
                                array
                            }
                        }
                        None => {
                            let extended = arena.alloc_slice_fill_copy(elements.len() + 1, value);
                            extended[..elements.len()].copy_from_slice(elements);
                            Value::Array(extended)
                        }
                    };
                    context.stack.push(result);
                }
                OpCode::Ms => context.matcher.clear(),
                OpCode::Msi => context.matcher.push(Some(instruction.arg0())),
                OpCode::Msd => context.matcher.push(None),
                OpCode::Msj => {
                    let top = stack
                        .peek_mut()
                        .ok_or(ExecutionErrorKind::StackUnderflow { opcode: name })?;
                    let elements = tuple_elements(*top, name)?;
                    let matcher = &context.matcher;
                    if elements.len() != matcher.len() {
                        return Err(ExecutionErrorKind::MatchArity {
                            buffered: matcher.len(),
                            len: elements.len(),
                        }
                        .into());
                    }
                    let mut matched = true;
                    for (expected, element) in matcher.iter().zip(elements) {
                        if let Some(expected) = expected {
                            match element {
                                Value::Sum(tag, _) => {
                                    if tag != expected {
                                        matched = false;
                                        break;
                                    }
                                }
                                other => return Err(mismatch(name, "sum", *other).into()),
                            }
                        }
                    }
                    if matched {
                        let rebuilt = arena.alloc_slice_fill_copy(elements.len(), Value::Nil);
                        for (slot, (expected, element)) in
                            rebuilt.iter_mut().zip(matcher.iter().zip(elements))
                        {
                            *slot = match (expected, element) {
                                (Some(_), Value::Sum(_, payload)) => **payload,
                                _ => *element,
                            };
                        }
                        *top = Value::Tuple(rebuilt);
                        frame.ip = instruction.dest();
                    }
                }
                OpCode::Des | OpCode::Ser => {
                    let index = instruction.wide();
                    let program = self.program;
                    let schema = program.schemas.get(index).ok_or_else(|| {
                        ExecutionErrorKind::Schema {
                            schema: format!("#{}", index),
                            message: format!("no schema at index {}", index),
                        }
                    })?;
                    let codec = self.codec.ok_or(ExecutionErrorKind::MissingCodec)?;
                    let value = pop(stack, name)?;
                    let converted = if op == OpCode::Des {
                        codec.decode(schema, value, arena)
                    } else {
                        codec.encode(schema, value, arena)
                    };
                    let converted = converted.map_err(|message| ExecutionErrorKind::Schema {
                        schema: schema.clone(),
                        message,
                    })?;
                    stack.push(converted);
                }
            }
        }
    }
}

/// Pushes a frame: context values, nil reserved slots, then the argument.
fn enter<'p, 'a>(
    stack: &mut Stack<Value<'a>>,
    callee: Callee<'p, 'a>,
    argument: Value<'a>,
) -> Frame<'p> {
    let base = stack.len();
    stack.extend_from_slice(callee.context);
    if let Some(itself) = callee.itself {
        stack.push(itself);
    }
    stack.push_n(callee.function.size.reserved as usize, Value::Nil);
    stack.push(argument);
    Frame {
        function: callee.function,
        base,
        ip: 0,
    }
}

/// Nothing but jumps and no-ops lead from `ip` to the end of the body.
fn is_tail_position(code: &Code, mut ip: usize) -> bool {
    while let Some(instruction) = code.get(ip) {
        match instruction.op() {
            OpCode::Nop => ip += 1,
            // Compiled code only jumps forward; anything else is not a tail.
            OpCode::Jmp if instruction.dest() > ip => ip = instruction.dest(),
            _ => return false,
        }
    }
    true
}

fn local_slot(frame: &Frame<'_>, offset: usize) -> Result<usize, ExecutionErrorKind> {
    if offset < frame.function.size.frame_size() {
        Ok(frame.base + offset)
    } else {
        Err(ExecutionErrorKind::InvalidLocal { offset })
    }
}

fn pop<'a>(
    stack: &mut Stack<Value<'a>>,
    opcode: &'static str,
) -> Result<Value<'a>, ExecutionErrorKind> {
    stack
        .pop()
        .ok_or(ExecutionErrorKind::StackUnderflow { opcode })
}

fn mismatch(opcode: &'static str, expected: &'static str, found: Value<'_>) -> ExecutionErrorKind {
    ExecutionErrorKind::TagMismatch {
        opcode,
        expected,
        found: found.kind(),
    }
}

fn tuple_elements<'a>(
    value: Value<'a>,
    opcode: &'static str,
) -> Result<&'a [Value<'a>], ExecutionErrorKind> {
    value.as_tuple().ok_or_else(|| mismatch(opcode, "tuple", value))
}

fn component<'a>(
    tuple: Value<'a>,
    index: u8,
    opcode: &'static str,
) -> Result<Value<'a>, ExecutionErrorKind> {
    let elements = tuple_elements(tuple, opcode)?;
    elements
        .get(index as usize)
        .copied()
        .ok_or(ExecutionErrorKind::ComponentOutOfRange {
            index: index as usize,
            len: elements.len(),
        })
}

fn trace_frame(frame: &Frame<'_>) -> TraceFrame {
    let info = &frame.function.info;
    let at = frame
        .ip
        .checked_sub(1)
        .and_then(|ip| frame.function.code.span_at(ip))
        .unwrap_or(&info.span);
    TraceFrame {
        function: info.display_name(),
        declared: info.span.clone(),
        at: at.clone(),
    }
}

/// Appends this call chain's live frames to the trace and logs each one.
fn unwind(context: &ExecutionContext<'_, '_>, frame: &Frame<'_>, err: &mut ExecutionError) {
    let start = err.trace.len();
    err.trace.push(trace_frame(frame));
    err.trace
        .extend(context.frames.iter().rev().map(trace_frame));
    for entry in &err.trace[start..] {
        error!(
            function = %entry.function,
            declared = %entry.declared,
            at = %entry.at,
            "{}",
            err.kind
        );
    }
}
