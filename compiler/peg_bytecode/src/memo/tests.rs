use super::*;
use peg_ir::ExprKind;

fn is_symbol(g: &mut Grammar, inner: ExprId) -> ExprId {
    g.arena_mut().alloc(ExprKind::IsSymbol {
        table: "NAME".into(),
        inner,
        last_only: true,
    })
}

#[test]
fn plain_expressions_are_position_keyed() {
    let mut g = Grammar::new();
    let lit = g.arena_mut().literal(b"ab");
    let star = g.arena_mut().repeat(lit);
    assert!(!is_context_sensitive(&g, star));
}

#[test]
fn state_queries_are_context_sensitive() {
    let mut g = Grammar::new();
    let x = g.arena_mut().byte(b'x');
    let query = is_symbol(&mut g, x);
    let indent = g.arena_mut().alloc(ExprKind::IsIndent);
    let seq = g.arena_mut().sequence([x, indent]);

    assert!(is_context_sensitive(&g, query));
    assert!(is_context_sensitive(&g, seq));
}

#[test]
fn sensitivity_is_found_through_references() {
    // A = "a" B ; B = <is NAME 'x'>
    let mut g = Grammar::new();
    let b = g.declare_rule("B");
    let a_byte = g.arena_mut().byte(b'a');
    let ref_b = g.arena_mut().nonterminal(b);
    let a_body = g.arena_mut().sequence([a_byte, ref_b]);
    g.add_rule("A", a_body);
    let x = g.arena_mut().byte(b'x');
    let query = is_symbol(&mut g, x);
    g.define_rule(b, query);

    assert!(is_context_sensitive(&g, a_body));
}

#[test]
fn mutual_recursion_terminates() {
    // A = "a" B / "" ; B = "b" A
    let mut g = Grammar::new();
    let a = g.declare_rule("A");
    let b = g.declare_rule("B");
    let ref_a = g.arena_mut().nonterminal(a);
    let ref_b = g.arena_mut().nonterminal(b);
    let a_byte = g.arena_mut().byte(b'a');
    let b_byte = g.arena_mut().byte(b'b');
    let a_seq = g.arena_mut().sequence([a_byte, ref_b]);
    let empty = g.arena_mut().empty();
    let a_body = g.arena_mut().choice([a_seq, empty]);
    let b_body = g.arena_mut().sequence([b_byte, ref_a]);
    g.define_rule(a, a_body);
    g.define_rule(b, b_body);

    assert!(!is_context_sensitive(&g, a_body));
    assert!(!is_context_sensitive(&g, ref_b));
}

#[test]
fn planner_issues_one_point_per_expression() {
    let mut g = Grammar::new();
    let x = g.arena_mut().byte(b'x');
    let query = is_symbol(&mut g, x);
    let y = g.arena_mut().byte(b'y');

    let mut planner = MemoPlanner::default();
    let first = planner.issue(&g, "Q", query, false).clone();
    let again = planner.issue(&g, "Other", query, false).clone();
    let plain = planner.issue(&g, "Y", y, false).clone();

    assert_eq!(first, again);
    assert_eq!(&*first.label, "Q");
    assert_eq!(first.key(), MemoKey::State);
    assert_eq!(plain.id, MemoId::new(1));
    assert_eq!(plain.key(), MemoKey::Position);
    assert_eq!(planner.into_points().len(), 2);
}

#[test]
fn node_slots_are_separate_from_plain_slots() {
    let mut g = Grammar::new();
    let y = g.arena_mut().byte(b'y');

    let mut planner = MemoPlanner::default();
    let plain = planner.issue(&g, "Y", y, false).clone();
    let node = planner.issue(&g, "@Y", y, true).clone();
    let node_again = planner.issue(&g, "@[1] Y", y, true).clone();

    assert_ne!(plain.id, node.id);
    assert_eq!(node, node_again);
    assert!(node.node);
    assert!(!plain.node);
    assert_eq!(planner.into_points().len(), 2);
}
