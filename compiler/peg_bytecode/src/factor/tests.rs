use super::*;

#[test]
fn shared_leading_node_is_factored() {
    // "ab" / "ac" / "x" with one shared 'a' node
    let mut g = Grammar::new();
    let a = g.arena_mut().byte(b'a');
    let b = g.arena_mut().byte(b'b');
    let c = g.arena_mut().byte(b'c');
    let x = g.arena_mut().byte(b'x');
    let ab = g.arena_mut().sequence([a, b]);
    let ac = g.arena_mut().sequence([a, c]);
    let choice = g.arena_mut().choice([ab, ac, x]);

    let factored = factor_common_prefix(&mut g, choice).expect("prefix is shared");
    assert_eq!(g.display(factored).to_string(), "'a' ('b' / 'c') / 'x'");
    // The original choice is untouched.
    assert_eq!(g.display(choice).to_string(), "\"ab\" / \"ac\" / 'x'");
}

#[test]
fn separately_built_literals_share_nothing() {
    let mut g = Grammar::new();
    let ab = g.arena_mut().literal(b"ab");
    let ac = g.arena_mut().literal(b"ac");
    let choice = g.arena_mut().choice([ab, ac]);
    assert_eq!(factor_common_prefix(&mut g, choice), None);
}

#[test]
fn merging_continues_while_heads_match() {
    let mut g = Grammar::new();
    let p = g.arena_mut().byte(b'p');
    let [a, b, c, z] = [b'a', b'b', b'c', b'z'].map(|byte| g.arena_mut().byte(byte));
    let pa = g.arena_mut().sequence([p, a]);
    let pb = g.arena_mut().sequence([p, b]);
    let pc = g.arena_mut().sequence([p, c]);
    let choice = g.arena_mut().choice([z, pa, pb, pc]);

    let factored = factor_common_prefix(&mut g, choice).expect("prefix is shared");
    assert_eq!(g.display(factored).to_string(), "'z' / 'p' ('a' / 'b' / 'c')");
}

#[test]
fn references_are_looked_through() {
    // A / 'x' 'c' with A = 'x' 'b'
    let mut g = Grammar::new();
    let x = g.arena_mut().byte(b'x');
    let b = g.arena_mut().byte(b'b');
    let c = g.arena_mut().byte(b'c');
    let xb = g.arena_mut().sequence([x, b]);
    let rule = g.add_rule("A", xb);
    let ref_a = g.arena_mut().nonterminal(rule);
    let xc = g.arena_mut().sequence([x, c]);
    let choice = g.arena_mut().choice([ref_a, xc]);

    let factored = factor_common_prefix(&mut g, choice).expect("prefix is shared");
    assert_eq!(g.display(factored).to_string(), "'x' ('b' / 'c')");
}

#[test]
fn non_choices_are_left_alone() {
    let mut g = Grammar::new();
    let lit = g.arena_mut().literal(b"ab");
    assert_eq!(factor_common_prefix(&mut g, lit), None);
}
