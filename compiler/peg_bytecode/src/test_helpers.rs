//! Test helpers: a reference machine for compiled programs, a direct
//! interpreter for grammars, and random grammar generation.
//!
//! The machine follows the instruction semantics the compiler targets. AST
//! instructions are no-ops. The interpreter walks expressions with ordinary
//! PEG semantics, so comparing the two checks that compilation preserves
//! the language.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "tests can panic")]

use std::hash::{Hash, Hasher};

use peg_ir::{ByteSet, ExprId, ExprKind, Grammar, RuleId};
use peg_source::{SourceBuffer, StringSource};
use proptest::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};

use crate::{CompileOptions, InstrId, MemoId, MemoKey, Opcode, Program};

/// Instructions executed before a run counts as diverged.
const STEP_LIMIT: usize = 200_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Accepted, stopping at this position.
    Matched(u64),
    Failed,
    Diverged,
}

pub(crate) struct Run {
    pub outcome: Outcome,
    /// Every instruction executed, in order.
    pub executed: Vec<InstrId>,
}

/// Symbol definitions and indent stack.
#[derive(Clone, Default, Hash)]
struct ParseState {
    symbols: Vec<(Box<str>, Vec<u8>)>,
    scopes: Vec<usize>,
    indents: Vec<Vec<u8>>,
}

impl ParseState {
    fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.symbols.hash(&mut hasher);
        self.indents.hash(&mut hasher);
        hasher.finish()
    }

    fn define(&mut self, table: &str, text: Vec<u8>) {
        self.symbols.push((table.into(), text));
    }

    fn is_symbol(&self, table: &str, text: &[u8], last_only: bool) -> bool {
        let mut defined = self.symbols.iter().rev().filter(|(t, _)| &**t == table);
        if last_only {
            defined.next().is_some_and(|(_, s)| s == text)
        } else {
            defined.any(|(_, s)| s == text)
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(self.symbols.len());
    }

    fn pop_scope(&mut self) {
        if let Some(len) = self.scopes.pop() {
            self.symbols.truncate(len);
        }
    }
}

struct Frame {
    pos: u64,
    on_fail: InstrId,
    calls: usize,
    positions: usize,
    state: ParseState,
}

#[derive(Copy, Clone)]
enum MemoEntry {
    Success(u64),
    Failed,
}

pub(crate) fn run(program: &Program, input: &[u8]) -> Run {
    let mut src = StringSource::new(input);
    run_on(program, &mut src)
}

/// Execute `program` from its entry over `src`.
pub(crate) fn run_on(program: &Program, src: &mut dyn SourceBuffer) -> Run {
    let len = src.len();
    let mut pc = program.entry();
    let mut pos = 0u64;
    let mut calls: Vec<InstrId> = Vec::new();
    let mut positions: Vec<u64> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut state = ParseState::default();
    let mut memo: FxHashMap<(MemoId, u64, u64), MemoEntry> = FxHashMap::default();
    let mut executed = Vec::new();

    let key_state = |key: MemoKey, state: &ParseState| match key {
        MemoKey::Position => 0,
        MemoKey::State => state.fingerprint(),
    };

    let outcome = 'run: loop {
        if executed.len() >= STEP_LIMIT {
            break Outcome::Diverged;
        }
        executed.push(pc);
        let instr = &program[pc];
        let mut failed = false;
        let mut jump = instr.next;

        match &instr.op {
            Opcode::Fail => failed = true,
            Opcode::Ret => match calls.pop() {
                Some(ret) => jump = Some(ret),
                None => break Outcome::Matched(pos),
            },
            Opcode::AnyByte => {
                if pos < len {
                    pos += 1;
                } else {
                    failed = true;
                }
            }
            Opcode::Byte { byte, optional } => {
                if pos < len && src.byte_at(pos) == *byte {
                    pos += 1;
                } else {
                    failed = !optional;
                }
            }
            Opcode::ByteClass { set, optional } => {
                if pos < len && set.contains(src.byte_at(pos)) {
                    pos += 1;
                } else {
                    failed = !optional;
                }
            }
            Opcode::RepeatedByteClass { set } => {
                while pos < len && set.contains(src.byte_at(pos)) {
                    pos += 1;
                }
            }
            Opcode::NotByteClass { set } => failed = pos < len && set.contains(src.byte_at(pos)),
            Opcode::NotLiteral { bytes } => failed = src.matches(pos, bytes),
            Opcode::FailPush { on_fail } => frames.push(Frame {
                pos,
                on_fail: *on_fail,
                calls: calls.len(),
                positions: positions.len(),
                state: state.clone(),
            }),
            Opcode::FailPop => {
                frames.pop();
            }
            Opcode::FailSkip { guarded } => {
                let frame = frames.last_mut().expect("fail_skip without a frame");
                if *guarded && frame.pos == pos {
                    jump = Some(frame.on_fail);
                    frames.pop();
                } else {
                    frame.pos = pos;
                    frame.state = state.clone();
                }
            }
            Opcode::PosPush => positions.push(pos),
            Opcode::PosBack => pos = positions.pop().expect("pos_back without pos_push"),
            Opcode::Dispatch { table } => {
                let slot = if pos < len {
                    usize::from(src.byte_at(pos))
                } else {
                    256
                };
                jump = Some(table[slot]);
            }
            Opcode::Call { target, .. } => {
                calls.push(instr.next.expect("call without return address"));
                jump = Some(target.expect("unlinked call"));
            }
            Opcode::MonitoredSwitch { activated } => jump = Some(*activated),
            Opcode::Lookup {
                memo: id,
                key,
                on_hit,
                on_memo_fail,
                ..
            }
            | Opcode::LookupNode {
                memo: id,
                key,
                on_hit,
                on_memo_fail,
                ..
            } => match memo.get(&(*id, pos, key_state(*key, &state))) {
                Some(MemoEntry::Success(end)) => {
                    pos = *end;
                    jump = Some(*on_hit);
                }
                Some(MemoEntry::Failed) => failed = true,
                None => frames.push(Frame {
                    pos,
                    on_fail: *on_memo_fail,
                    calls: calls.len(),
                    positions: positions.len(),
                    state: state.clone(),
                }),
            },
            Opcode::Memoize { memo: id, key, .. } | Opcode::MemoizeNode { memo: id, key, .. } => {
                let frame = frames.pop().expect("memoize without a lookup frame");
                let at = key_state(*key, &frame.state);
                memo.insert((*id, frame.pos, at), MemoEntry::Success(pos));
            }
            Opcode::MemoizeFail { memo: id, key, .. } => {
                memo.insert((*id, pos, key_state(*key, &state)), MemoEntry::Failed);
                failed = true;
            }
            Opcode::NodePush
            | Opcode::NodeStore { .. }
            | Opcode::New { .. }
            | Opcode::Capture
            | Opcode::Tag(_)
            | Opcode::Replace(_) => {}
            Opcode::TablePush => state.push_scope(),
            Opcode::TablePop => state.pop_scope(),
            Opcode::DefSymbol { table } => {
                let start = positions.pop().expect("def_symbol without pos_push");
                let text = src.subbytes(start, pos);
                state.define(table, text);
            }
            Opcode::IsSymbol { table, last_only } => {
                let start = positions.pop().expect("is_symbol without pos_push");
                let text = src.subbytes(start, pos);
                failed = !state.is_symbol(table, &text, *last_only);
            }
            Opcode::DefIndent => {
                let indent = src.indent_text(pos).into_bytes();
                state.indents.push(indent);
            }
            Opcode::IsIndent => {
                let indent = state.indents.last().cloned().unwrap_or_default();
                if src.matches(pos, &indent) {
                    pos += indent.len() as u64;
                } else {
                    failed = true;
                }
            }
        }

        if failed {
            let Some(frame) = frames.pop() else {
                break 'run Outcome::Failed;
            };
            pos = frame.pos;
            calls.truncate(frame.calls);
            positions.truncate(frame.positions);
            state = frame.state;
            jump = Some(frame.on_fail);
        }
        pc = jump.expect("instruction without a successor");
    };

    Run { outcome, executed }
}

/// Match `rule` against `input` by walking the grammar directly.
pub(crate) fn interpret(grammar: &Grammar, rule: RuleId, input: &[u8]) -> Outcome {
    let mut walker = Walker {
        grammar,
        src: StringSource::new(input),
        len: input.len() as u64,
        state: ParseState::default(),
        steps: 0,
    };
    let Some(body) = grammar.rule(rule).body else {
        return Outcome::Failed;
    };
    match walker.eval(body, 0) {
        Ok(Some(end)) => Outcome::Matched(end),
        Ok(None) => Outcome::Failed,
        Err(Diverged) => Outcome::Diverged,
    }
}

struct Diverged;

struct Walker<'a> {
    grammar: &'a Grammar,
    src: StringSource,
    len: u64,
    state: ParseState,
    steps: usize,
}

impl Walker<'_> {
    fn byte(&mut self, pos: u64) -> Option<u8> {
        (pos < self.len).then(|| self.src.byte_at(pos))
    }

    fn eval(&mut self, expr: ExprId, pos: u64) -> Result<Option<u64>, Diverged> {
        self.steps += 1;
        if self.steps > STEP_LIMIT {
            return Err(Diverged);
        }
        let grammar = self.grammar;
        Ok(match grammar.kind(expr) {
            ExprKind::Empty
            | ExprKind::New { .. }
            | ExprKind::Capture
            | ExprKind::Tag(_)
            | ExprKind::Replace(_) => Some(pos),
            ExprKind::Fail => None,
            ExprKind::AnyByte => self.byte(pos).map(|_| pos + 1),
            ExprKind::Byte(b) => (self.byte(pos) == Some(*b)).then_some(pos + 1),
            ExprKind::ByteClass(set) => self
                .byte(pos)
                .filter(|&b| set.contains(b))
                .map(|_| pos + 1),
            ExprKind::Sequence(items) | ExprKind::Construct { body: items, .. } => {
                let mut at = pos;
                for &item in items {
                    match self.eval(item, at)? {
                        Some(next) => at = next,
                        None => return Ok(None),
                    }
                }
                Some(at)
            }
            ExprKind::Choice(alts) => {
                for &alt in alts {
                    let saved = self.state.clone();
                    if let Some(end) = self.eval(alt, pos)? {
                        return Ok(Some(end));
                    }
                    self.state = saved;
                }
                None
            }
            ExprKind::Repeat { inner, .. } => Some(self.repeat(*inner, pos)?),
            ExprKind::Repeat1 { inner, .. } => match self.eval(*inner, pos)? {
                Some(at) => Some(self.repeat(*inner, at)?),
                None => None,
            },
            ExprKind::Optional(inner) => {
                let saved = self.state.clone();
                match self.eval(*inner, pos)? {
                    Some(end) => Some(end),
                    None => {
                        self.state = saved;
                        Some(pos)
                    }
                }
            }
            ExprKind::And(inner) => self.eval(*inner, pos)?.map(|_| pos),
            ExprKind::Not(inner) => {
                let saved = self.state.clone();
                let matched = self.eval(*inner, pos)?.is_some();
                self.state = saved;
                (!matched).then_some(pos)
            }
            ExprKind::NonTerminal(rule) => match grammar.rule(*rule).body {
                Some(body) => self.eval(body, pos)?,
                None => None,
            },
            ExprKind::Link { inner, .. } => self.eval(*inner, pos)?,
            ExprKind::Block(inner) => {
                self.state.push_scope();
                let end = self.eval(*inner, pos)?;
                self.state.pop_scope();
                end
            }
            ExprKind::DefSymbol { table, inner } => {
                let end = self.eval(*inner, pos)?;
                if let Some(end) = end {
                    let text = self.src.subbytes(pos, end);
                    self.state.define(table, text);
                }
                end
            }
            ExprKind::IsSymbol {
                table,
                inner,
                last_only,
            } => match self.eval(*inner, pos)? {
                Some(end) => {
                    let text = self.src.subbytes(pos, end);
                    self.state.is_symbol(table, &text, *last_only).then_some(end)
                }
                None => None,
            },
            ExprKind::DefIndent => {
                let indent = self.src.indent_text(pos).into_bytes();
                self.state.indents.push(indent);
                Some(pos)
            }
            ExprKind::IsIndent => {
                let indent = self.state.indents.last().cloned().unwrap_or_default();
                self.src
                    .matches(pos, &indent)
                    .then_some(pos + indent.len() as u64)
            }
        })
    }

    /// Zero or more `inner`, stopping at the first failure or at an
    /// iteration that consumed nothing.
    fn repeat(&mut self, inner: ExprId, mut pos: u64) -> Result<u64, Diverged> {
        loop {
            let saved = self.state.clone();
            match self.eval(inner, pos)? {
                Some(next) if next != pos => pos = next,
                Some(_) => return Ok(pos),
                None => {
                    self.state = saved;
                    return Ok(pos);
                }
            }
        }
    }
}

/// Random expression shape over the alphabet `a`, `b`, `c`.
#[derive(Clone, Debug)]
pub(crate) enum Shape {
    Empty,
    Any,
    Byte(u8),
    Class(Vec<u8>),
    Literal(Vec<u8>),
    Seq(Vec<Shape>),
    Choice(Vec<Shape>),
    Repeat(Box<Shape>),
    Repeat1(Box<Shape>),
    Optional(Box<Shape>),
    And(Box<Shape>),
    Not(Box<Shape>),
    /// Reference to a later rule, chosen by offset.
    Ref(usize),
    /// A choice whose alternatives all start with one shared node.
    SharedPrefix(Box<Shape>, Vec<Shape>),
    /// `!lit1 … !litk .`
    NotThenAny(Vec<Vec<u8>>),
}

fn alphabet() -> impl Strategy<Value = u8> {
    prop::sample::select(vec![b'a', b'b', b'c'])
}

fn word() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(alphabet(), 2..4)
}

pub(crate) fn shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        Just(Shape::Empty),
        Just(Shape::Any),
        alphabet().prop_map(Shape::Byte),
        prop::collection::vec(alphabet(), 1..3).prop_map(Shape::Class),
        word().prop_map(Shape::Literal),
        (0usize..4).prop_map(Shape::Ref),
        prop::collection::vec(word(), 1..3).prop_map(Shape::NotThenAny),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Shape::Seq),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Shape::Choice),
            inner.clone().prop_map(|s| Shape::Repeat(Box::new(s))),
            inner.clone().prop_map(|s| Shape::Repeat1(Box::new(s))),
            inner.clone().prop_map(|s| Shape::Optional(Box::new(s))),
            inner.clone().prop_map(|s| Shape::And(Box::new(s))),
            inner.clone().prop_map(|s| Shape::Not(Box::new(s))),
            (inner.clone(), prop::collection::vec(inner, 2..4))
                .prop_map(|(p, rest)| Shape::SharedPrefix(Box::new(p), rest)),
        ]
    })
}

pub(crate) fn input() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(alphabet(), 0..8)
}

/// Build rules `R0..Rn` from shapes. References only point forward, so the
/// rule graph is acyclic and every repetition's nullable flag is exact.
pub(crate) fn build_grammar(shapes: &[Shape]) -> (Grammar, Vec<RuleId>) {
    let mut grammar = Grammar::new();
    let rules: Vec<RuleId> = (0..shapes.len())
        .map(|i| grammar.declare_rule(&format!("R{i}")))
        .collect();
    let mut nullable = vec![false; shapes.len()];
    for (i, shape) in shapes.iter().enumerate().rev() {
        let mut builder = ShapeBuilder {
            grammar: &mut grammar,
            rules: &rules,
            nullable: &nullable,
            current: i,
        };
        let (body, is_nullable) = builder.build(shape);
        grammar.define_rule(rules[i], body);
        nullable[i] = is_nullable;
    }
    (grammar, rules)
}

struct ShapeBuilder<'a> {
    grammar: &'a mut Grammar,
    rules: &'a [RuleId],
    nullable: &'a [bool],
    current: usize,
}

impl ShapeBuilder<'_> {
    /// The node and whether it can succeed without consuming.
    fn build(&mut self, shape: &Shape) -> (ExprId, bool) {
        match shape {
            Shape::Empty => (self.grammar.arena_mut().empty(), true),
            Shape::Any => (self.grammar.arena_mut().any_byte(), false),
            Shape::Byte(b) => (self.grammar.arena_mut().byte(*b), false),
            Shape::Class(bytes) => {
                let set = ByteSet::from_bytes(bytes);
                (self.grammar.arena_mut().byte_class(set), false)
            }
            Shape::Literal(bytes) => (self.grammar.arena_mut().literal(bytes), false),
            Shape::Seq(items) => {
                let built: Vec<_> = items.iter().map(|s| self.build(s)).collect();
                let nullable = built.iter().all(|&(_, n)| n);
                let seq = self.grammar.arena_mut().sequence(built.into_iter().map(|(e, _)| e));
                (seq, nullable)
            }
            Shape::Choice(alts) => {
                let built: Vec<_> = alts.iter().map(|s| self.build(s)).collect();
                let nullable = built.iter().any(|&(_, n)| n);
                let choice = self.grammar.arena_mut().choice(built.into_iter().map(|(e, _)| e));
                (choice, nullable)
            }
            Shape::Repeat(inner) => {
                let (inner, nullable) = self.build(inner);
                let node = self.grammar.arena_mut().alloc(ExprKind::Repeat { inner, nullable });
                (node, true)
            }
            Shape::Repeat1(inner) => {
                let (inner, nullable) = self.build(inner);
                let node = self.grammar.arena_mut().alloc(ExprKind::Repeat1 { inner, nullable });
                (node, nullable)
            }
            Shape::Optional(inner) => {
                let (inner, _) = self.build(inner);
                (self.grammar.arena_mut().optional(inner), true)
            }
            Shape::And(inner) => {
                let (inner, _) = self.build(inner);
                (self.grammar.arena_mut().and(inner), true)
            }
            Shape::Not(inner) => {
                let (inner, _) = self.build(inner);
                (self.grammar.arena_mut().not(inner), true)
            }
            Shape::Ref(offset) => {
                let later = self.rules.len() - self.current - 1;
                if later == 0 {
                    return (self.grammar.arena_mut().byte(b'a'), false);
                }
                let target = self.current + 1 + offset % later;
                let node = self.grammar.arena_mut().nonterminal(self.rules[target]);
                (node, self.nullable[target])
            }
            Shape::SharedPrefix(prefix, rests) => {
                let (prefix, prefix_nullable) = self.build(prefix);
                let mut nullable = false;
                let mut alts = Vec::new();
                for rest in rests {
                    let (rest, rest_nullable) = self.build(rest);
                    nullable |= prefix_nullable && rest_nullable;
                    alts.push(self.grammar.arena_mut().sequence([prefix, rest]));
                }
                (self.grammar.arena_mut().choice(alts), nullable)
            }
            Shape::NotThenAny(words) => {
                let mut items = Vec::new();
                for word in words {
                    let literal = self.grammar.arena_mut().literal(word);
                    items.push(self.grammar.arena_mut().not(literal));
                }
                items.push(self.grammar.arena_mut().any_byte());
                (self.grammar.arena_mut().sequence(items), false)
            }
        }
    }
}

/// Every expression reachable from `expr` without following references.
pub(crate) fn subtree(grammar: &Grammar, expr: ExprId) -> Vec<ExprId> {
    let mut out = Vec::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        out.push(e);
        stack.extend_from_slice(grammar.kind(e).children());
    }
    out
}

/// All 32 flag combinations.
pub(crate) fn every_option_set() -> impl Iterator<Item = CompileOptions> {
    (0..32u8).map(CompileOptions::from_bits_truncate)
}

/// Compile a copy of `grammar` under each flag combination and run every
/// input, checking the result against [`interpret`].
pub(crate) fn assert_same_language(grammar: &Grammar, rules: &[RuleId], inputs: &[&[u8]]) {
    for options in every_option_set() {
        let mut compiled = grammar.clone();
        let program = crate::compile(&mut compiled, rules, options).expect("grammar compiles");
        for &input in inputs {
            let expected = interpret(grammar, rules[0], input);
            let actual = run(&program, input).outcome;
            assert_eq!(
                actual,
                expected,
                "{options:?} on {:?}\n{}",
                input.escape_ascii().to_string(),
                program.dump(&compiled)
            );
        }
    }
}
