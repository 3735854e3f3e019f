//! Expression-to-instruction encoding.
//!
//! Encoding is continuation passing: [`Compiler::encode`] takes the code
//! that runs after an expression succeeds and returns the code for "this
//! expression, then that". Sequences therefore compile right to left, and
//! several expressions may share one continuation.

use peg_ir::optimize::{dispatch_form, literal_bytes};
use peg_ir::{ensure_sufficient_stack, optimize, ExprId, ExprKind, Grammar, RuleId, DISPATCH_SLOTS};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::builder::CodeBuilder;
use crate::factor::factor_common_prefix;
use crate::memo::MemoPlanner;
use crate::{CodeBlock, CompileError, CompileOptions, InstrId, MemoId, MemoKey, Opcode, Program};

/// One compilation session: the instruction arena, the compiled rule
/// blocks, and the memo slots issued so far.
pub struct Compiler<'g> {
    grammar: &'g mut Grammar,
    options: CompileOptions,
    code: CodeBuilder,
    memo: MemoPlanner,
    /// Heads are arena ids until [`Compiler::finish`].
    blocks: Vec<CodeBlock>,
    by_rule: FxHashMap<RuleId, usize>,
}

/// Slot and key of a memo point, copied out of the planner.
#[derive(Copy, Clone)]
struct Memo {
    id: MemoId,
    key: MemoKey,
}

impl<'g> Compiler<'g> {
    pub fn new(grammar: &'g mut Grammar, options: CompileOptions) -> Self {
        Compiler {
            grammar,
            options,
            code: CodeBuilder::default(),
            memo: MemoPlanner::default(),
            blocks: Vec::new(),
            by_rule: FxHashMap::default(),
        }
    }

    /// Compile `rules` in order and link them. The first rule is the entry.
    pub fn compile(mut self, rules: &[RuleId]) -> Result<Program, CompileError> {
        if rules.is_empty() {
            return Err(CompileError::EmptyRuleList);
        }
        for &rule in rules {
            self.compile_rule(rule)?;
        }
        self.finish()
    }

    /// Compile one rule into its own block. A rule already compiled in this
    /// session is skipped.
    pub fn compile_rule(&mut self, rule: RuleId) -> Result<(), CompileError> {
        if self.by_rule.contains_key(&rule) {
            return Ok(());
        }
        let Some(body) = self.grammar.rule(rule).body else {
            return Err(self.undefined(rule));
        };
        let ret = self.code.emit(Opcode::Ret, None, body);
        let head = self.encode(body, ret);

        let start = self.code.placed_len();
        self.code.place(head);
        let end = self.code.placed_len();
        debug!(
            rule = %self.grammar.rule(rule).name,
            instructions = end - start,
            "rule compiled"
        );

        self.by_rule.insert(rule, self.blocks.len());
        self.blocks.push(CodeBlock {
            rule,
            head,
            start,
            end,
        });
        Ok(())
    }

    /// Resolve every call to the head of its rule's block, then number the
    /// placed instructions densely.
    pub fn finish(mut self) -> Result<Program, CompileError> {
        if self.blocks.is_empty() {
            return Err(CompileError::EmptyRuleList);
        }
        let placed = self.code.placed_since(0).to_vec();
        for id in placed {
            let Opcode::Call { rule, .. } = *self.code.op_mut(id) else {
                continue;
            };
            let head = match self.by_rule.get(&rule) {
                Some(&block) => self.blocks[block].head,
                None if self.grammar.rule(rule).body.is_none() => return Err(self.undefined(rule)),
                None => {
                    return Err(CompileError::UnlinkedCall {
                        name: self.grammar.rule(rule).name.clone(),
                    })
                }
            };
            if let Opcode::Call { target, .. } = self.code.op_mut(id) {
                *target = Some(head);
            }
        }

        let (mut code, slot) = self.code.finish();
        for block in &mut self.blocks {
            if let Some(head) = slot[block.head.index()] {
                block.head = head;
                code[head.index()].label = true;
            }
        }
        Ok(Program::new(code, self.blocks, self.memo.into_points()))
    }

    fn undefined(&self, rule: RuleId) -> CompileError {
        CompileError::UndefinedRule {
            name: self.grammar.rule(rule).name.clone(),
        }
    }

    #[inline]
    fn enabled(&self, flag: CompileOptions) -> bool {
        self.options.contains(flag)
    }

    #[inline]
    fn emit(&mut self, op: Opcode, next: InstrId, origin: ExprId) -> InstrId {
        self.code.emit(op, Some(next), origin)
    }

    /// An instruction with no fallthrough.
    #[inline]
    fn emit_end(&mut self, op: Opcode, origin: ExprId) -> InstrId {
        self.code.emit(op, None, origin)
    }

    /// The rewritten form of `expr` when specialization is on, else `expr`.
    fn rewrite(&mut self, expr: ExprId) -> ExprId {
        if self.enabled(CompileOptions::SPECIALIZE) {
            optimize(self.grammar, expr)
        } else {
            expr
        }
    }

    /// Code for `expr` followed by `next`.
    pub(crate) fn encode(&mut self, expr: ExprId, next: InstrId) -> InstrId {
        ensure_sufficient_stack(|| self.encode_kind(expr, next))
    }

    fn encode_kind(&mut self, expr: ExprId, next: InstrId) -> InstrId {
        let ast = self.enabled(CompileOptions::AST);
        match self.grammar.kind(expr).clone() {
            ExprKind::Empty => next,
            ExprKind::Fail => self.emit_end(Opcode::Fail, expr),
            ExprKind::AnyByte => self.emit(Opcode::AnyByte, next, expr),
            ExprKind::Byte(byte) => self.emit(
                Opcode::Byte {
                    byte,
                    optional: false,
                },
                next,
                expr,
            ),
            ExprKind::ByteClass(set) => self.emit(
                Opcode::ByteClass {
                    set,
                    optional: false,
                },
                next,
                expr,
            ),
            ExprKind::Sequence(items) => self.encode_sequence(expr, &items, next),
            ExprKind::Choice(alts) => self.encode_choice(expr, &alts, next),
            ExprKind::Repeat { inner, nullable } => self.encode_repeat(expr, inner, nullable, next),
            ExprKind::Repeat1 { inner, nullable } => {
                let rest = self.encode_repeat(expr, inner, nullable, next);
                self.encode(inner, rest)
            }
            ExprKind::Optional(inner) => self.encode_optional(expr, inner, next),
            ExprKind::And(inner) => {
                let back = self.emit(Opcode::PosBack, next, expr);
                let body = self.encode(inner, back);
                self.emit(Opcode::PosPush, body, expr)
            }
            ExprKind::Not(inner) => self.encode_not(expr, inner, next),
            ExprKind::NonTerminal(rule) => self.encode_nonterminal(expr, rule, next),

            ExprKind::Construct { body, left } => {
                if !ast {
                    return self.encode_sequence(expr, &body, next);
                }
                let capture = self.emit(Opcode::Capture, next, expr);
                let body = self.encode_sequence(expr, &body, capture);
                self.emit(Opcode::New { left }, body, expr)
            }
            ExprKind::New { left } if ast => self.emit(Opcode::New { left }, next, expr),
            ExprKind::Capture if ast => self.emit(Opcode::Capture, next, expr),
            ExprKind::Tag(tag) if ast => self.emit(Opcode::Tag(tag), next, expr),
            ExprKind::Replace(text) if ast => self.emit(Opcode::Replace(text), next, expr),
            ExprKind::New { .. } | ExprKind::Capture | ExprKind::Tag(_) | ExprKind::Replace(_) => {
                next
            }
            ExprKind::Link { inner, index } => self.encode_link(expr, inner, index, next),

            ExprKind::Block(inner) => {
                let fail = self.emit_end(Opcode::Fail, expr);
                let failed = self.emit(Opcode::TablePop, fail, expr);
                let pop_table = self.emit(Opcode::TablePop, next, expr);
                let pop = self.emit(Opcode::FailPop, pop_table, expr);
                let body = self.encode(inner, pop);
                let push = self.emit(Opcode::FailPush { on_fail: failed }, body, expr);
                self.emit(Opcode::TablePush, push, expr)
            }
            ExprKind::DefSymbol { table, inner } => {
                let def = self.emit(Opcode::DefSymbol { table }, next, expr);
                let body = self.encode(inner, def);
                self.emit(Opcode::PosPush, body, expr)
            }
            ExprKind::IsSymbol {
                table,
                inner,
                last_only,
            } => {
                let check = self.emit(Opcode::IsSymbol { table, last_only }, next, expr);
                let body = self.encode(inner, check);
                self.emit(Opcode::PosPush, body, expr)
            }
            ExprKind::DefIndent => self.emit(Opcode::DefIndent, next, expr),
            ExprKind::IsIndent => self.emit(Opcode::IsIndent, next, expr),
        }
    }

    fn encode_sequence(&mut self, expr: ExprId, items: &[ExprId], next: InstrId) -> InstrId {
        let rewritten = self.rewrite(expr);
        if rewritten != expr && self.grammar.kind(rewritten).is_terminal() {
            trace!(expr = ?expr, "sequence specialized to terminal");
            return self.encode(rewritten, next);
        }

        let mut start = next;
        for &item in items.iter().rev() {
            start = self.encode(item, start);
        }

        // `!"ab" !"cd" .`: bytes that start no negated operand go straight
        // to `.`; the rest run the full sequence.
        let fast = if rewritten == expr {
            None
        } else {
            dispatch_form(self.grammar, rewritten)
        };
        if let Some(fast) = fast {
            trace!(expr = ?expr, fast = ?fast, "sequence dispatches on first byte");
            let any = self.emit(Opcode::AnyByte, next, rewritten);
            let table = (0..DISPATCH_SLOTS)
                .map(|slot| match u8::try_from(slot) {
                    Ok(byte) if fast.contains(byte) => any,
                    _ => start,
                })
                .collect();
            return self.emit_end(Opcode::Dispatch { table }, expr);
        }
        start
    }

    fn encode_choice(&mut self, expr: ExprId, alts: &[ExprId], next: InstrId) -> InstrId {
        let rewritten = self.rewrite(expr);
        if rewritten != expr && matches!(self.grammar.kind(rewritten), ExprKind::ByteClass(_)) {
            trace!(expr = ?expr, "choice specialized to byte class");
            return self.encode(rewritten, next);
        }
        if let Some(table) = self.grammar.arena().partition(expr).map(<[ExprId]>::to_vec) {
            return self.encode_prefetch(expr, &table, next);
        }
        self.encode_alternatives(expr, alts, next)
    }

    /// Jump table from a first-byte partition. Each distinct target is
    /// encoded once per table.
    fn encode_prefetch(&mut self, choice: ExprId, partition: &[ExprId], next: InstrId) -> InstrId {
        let mut encoded: FxHashMap<ExprId, InstrId> = FxHashMap::default();
        let mut table = Vec::with_capacity(DISPATCH_SLOTS);
        for &target in partition {
            let code = match encoded.get(&target) {
                Some(&code) => code,
                None => {
                    // A slot selecting the choice itself, or a narrower
                    // choice, must not re-enter this table.
                    let code = if target == choice || matches!(self.grammar.kind(target), ExprKind::Choice(_)) {
                        self.encode_factored(target, next)
                    } else {
                        self.encode(target, next)
                    };
                    encoded.insert(target, code);
                    code
                }
            };
            table.push(code);
        }
        trace!(choice = ?choice, targets = encoded.len(), "choice dispatches on first byte");
        self.emit_end(
            Opcode::Dispatch {
                table: table.into_boxed_slice(),
            },
            choice,
        )
    }

    /// Factor a choice's common prefixes if enabled and possible, otherwise
    /// encode it as plain backtracking alternatives.
    fn encode_factored(&mut self, choice: ExprId, next: InstrId) -> InstrId {
        if self.enabled(CompileOptions::COMMON_PREFIX) {
            if let Some(factored) = factor_common_prefix(self.grammar, choice) {
                return self.encode(factored, next);
            }
        }
        match self.grammar.kind(choice).clone() {
            ExprKind::Choice(alts) => self.encode_alternatives(choice, &alts, next),
            _ => self.encode(choice, next),
        }
    }

    /// Try each alternative in order; a failure restores the position and
    /// moves on to the next.
    fn encode_alternatives(&mut self, expr: ExprId, alts: &[ExprId], next: InstrId) -> InstrId {
        let Some((&last, init)) = alts.split_last() else {
            return self.emit_end(Opcode::Fail, expr);
        };
        let mut rest = self.encode(last, next);
        for &alt in init.iter().rev() {
            let pop = self.emit(Opcode::FailPop, next, alt);
            let body = self.encode(alt, pop);
            rest = self.emit(Opcode::FailPush { on_fail: rest }, body, alt);
        }
        rest
    }

    fn encode_repeat(&mut self, expr: ExprId, inner: ExprId, nullable: bool, next: InstrId) -> InstrId {
        if self.enabled(CompileOptions::SPECIALIZE) {
            let rewritten = self.rewrite(inner);
            if let Some(set) = self.grammar.kind(rewritten).as_byte_set() {
                trace!(expr = ?expr, "repetition specialized");
                return self.emit(Opcode::RepeatedByteClass { set }, next, expr);
            }
        }
        let skip = self.emit_end(Opcode::FailSkip { guarded: nullable }, expr);
        let start = self.encode(inner, skip);
        self.code.patch_next(skip, start);
        self.emit(Opcode::FailPush { on_fail: next }, start, expr)
    }

    fn encode_optional(&mut self, expr: ExprId, inner: ExprId, next: InstrId) -> InstrId {
        if self.enabled(CompileOptions::SPECIALIZE) {
            let rewritten = self.rewrite(inner);
            let op = match self.grammar.kind(rewritten) {
                ExprKind::Byte(byte) => Some(Opcode::Byte {
                    byte: *byte,
                    optional: true,
                }),
                ExprKind::ByteClass(set) => Some(Opcode::ByteClass {
                    set: *set,
                    optional: true,
                }),
                _ => None,
            };
            if let Some(op) = op {
                trace!(expr = ?expr, "option specialized");
                return self.emit(op, next, expr);
            }
        }
        let pop = self.emit(Opcode::FailPop, next, expr);
        let body = self.encode(inner, pop);
        self.emit(Opcode::FailPush { on_fail: next }, body, expr)
    }

    fn encode_not(&mut self, expr: ExprId, inner: ExprId, next: InstrId) -> InstrId {
        if self.enabled(CompileOptions::SPECIALIZE) {
            let rewritten = self.rewrite(inner);
            let op = match self.grammar.kind(rewritten).as_byte_set() {
                Some(set) => Some(Opcode::NotByteClass { set }),
                None => literal_bytes(self.grammar, rewritten).map(|bytes| Opcode::NotLiteral { bytes }),
            };
            if let Some(op) = op {
                trace!(expr = ?expr, "negation specialized");
                return self.emit(op, next, expr);
            }
        }
        let fail = self.emit_end(Opcode::Fail, expr);
        let pop = self.emit(Opcode::FailPop, fail, expr);
        let body = self.encode(inner, pop);
        self.emit(Opcode::FailPush { on_fail: next }, body, expr)
    }

    fn encode_nonterminal(&mut self, expr: ExprId, rule: RuleId, next: InstrId) -> InstrId {
        let rewritten = self.rewrite(expr);
        if rewritten != expr && self.grammar.kind(rewritten).is_terminal() {
            trace!(rule = %self.grammar.rule(rule).name, "reference inlined");
            return self.encode(rewritten, next);
        }

        let call = Opcode::Call { rule, target: None };
        let Some(body) = self.grammar.rule(rule).body else {
            return self.emit(call, next, expr);
        };
        let memoizable = self.enabled(CompileOptions::PACKRAT)
            && (!self.enabled(CompileOptions::AST) || self.grammar.is_ast_free(rule));
        if !memoizable {
            return self.emit(call, next, expr);
        }

        let target = self.grammar.resolve_nonterminal(body);
        let label = self.grammar.rule(rule).name.clone();
        let memo = self.issue_memo(&label, target, false);

        let monitor = if self.enabled(CompileOptions::TRACING) {
            let plain = self.emit(call.clone(), next, expr);
            Some(self.emit(Opcode::MonitoredSwitch { activated: plain }, plain, expr))
        } else {
            None
        };
        let memoize = self.emit(
            Opcode::Memoize {
                memo: memo.id,
                key: memo.key,
                monitor,
            },
            next,
            expr,
        );
        let inside = self.emit(call, memoize, expr);
        let memo_fail = self.emit_end(
            Opcode::MemoizeFail {
                memo: memo.id,
                key: memo.key,
                monitor,
            },
            expr,
        );
        let lookup = self.emit(
            Opcode::Lookup {
                memo: memo.id,
                key: memo.key,
                on_hit: next,
                on_memo_fail: memo_fail,
                monitor,
            },
            inside,
            expr,
        );
        self.activate(monitor, lookup)
    }

    fn encode_link(&mut self, expr: ExprId, inner: ExprId, index: i32, next: InstrId) -> InstrId {
        if !self.enabled(CompileOptions::AST) {
            return self.encode(inner, next);
        }
        if !self.enabled(CompileOptions::PACKRAT) {
            return self.encode_node_push(expr, inner, index, next);
        }

        // Node entries are never shared with a plain reference to the same rule.
        let target = self.grammar.resolve_nonterminal(inner);
        let label = self.grammar.display(expr).to_string();
        let memo = self.issue_memo(&label, target, true);

        let monitor = if self.enabled(CompileOptions::TRACING) {
            let plain = self.encode_node_push(expr, inner, index, next);
            Some(self.emit(Opcode::MonitoredSwitch { activated: plain }, plain, expr))
        } else {
            None
        };
        let memoize = self.emit(
            Opcode::MemoizeNode {
                memo: memo.id,
                key: memo.key,
                monitor,
                index,
            },
            next,
            expr,
        );
        let inside = self.encode(inner, memoize);
        let memo_fail = self.emit_end(
            Opcode::MemoizeFail {
                memo: memo.id,
                key: memo.key,
                monitor,
            },
            expr,
        );
        let lookup = self.emit(
            Opcode::LookupNode {
                memo: memo.id,
                key: memo.key,
                on_hit: next,
                on_memo_fail: memo_fail,
                monitor,
                index,
            },
            inside,
            expr,
        );
        self.activate(monitor, lookup)
    }

    fn encode_node_push(&mut self, expr: ExprId, inner: ExprId, index: i32, next: InstrId) -> InstrId {
        let store = self.emit(Opcode::NodeStore { index }, next, expr);
        let body = self.encode(inner, store);
        self.emit(Opcode::NodePush, body, expr)
    }

    fn issue_memo(&mut self, label: &str, expr: ExprId, node: bool) -> Memo {
        let point = self.memo.issue(self.grammar, label, expr, node);
        Memo {
            id: point.id,
            key: point.key(),
        }
    }

    /// Point a monitored switch at the memoized path and return the switch,
    /// or return `lookup` when there is no switch.
    fn activate(&mut self, monitor: Option<InstrId>, lookup: InstrId) -> InstrId {
        let Some(monitor) = monitor else {
            return lookup;
        };
        if let Opcode::MonitoredSwitch { activated } = self.code.op_mut(monitor) {
            *activated = lookup;
        }
        monitor
    }
}

/// Compile `rules` into one linked program. The first rule is the entry.
///
/// Every rule that is called must be in `rules`; calls are linked after all
/// rules are compiled, so forward and recursive references are fine.
pub fn compile(grammar: &mut Grammar, rules: &[RuleId], options: CompileOptions) -> Result<Program, CompileError> {
    Compiler::new(grammar, options).compile(rules)
}
