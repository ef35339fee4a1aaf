//! Line splitting and rule matching.

use bytes::Bytes;

use super::destination::RuleSet;

/// Split `packet` on `\n` and hand every line that matches a rule to `send`.
///
/// Lines are visited in packet order and rules in rule order. A line is emitted
/// once per matching rule, so a line matching two rules is sent twice. Each
/// emitted buffer is the line followed by `\n`; a packet that ends in `\n`
/// yields a trailing empty line, which is matched like any other.
///
/// Returns the number of lines emitted. An empty rule set emits nothing.
pub fn match_lines<F>(packet: &[u8], rules: &RuleSet, mut send: F) -> usize
where
    F: FnMut(Bytes),
{
    if rules.is_empty() {
        return 0;
    }

    let text = String::from_utf8_lossy(packet);
    let mut emitted = 0;

    for line in text.split('\n') {
        for rule in rules.rules() {
            if rule.is_match(line) {
                let mut buf = Vec::with_capacity(line.len() + 1);
                buf.extend_from_slice(line.as_bytes());
                buf.push(b'\n');
                send(Bytes::from(buf));
                emitted += 1;
            }
        }
    }

    emitted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(packet: &str, patterns: &[&str]) -> Vec<String> {
        let rules = RuleSet::compile(patterns).unwrap();
        let mut out = Vec::new();
        match_lines(packet.as_bytes(), &rules, |line| {
            out.push(String::from_utf8(line.to_vec()).unwrap());
        });
        out
    }

    #[test]
    fn test_anchored_rule_selects_one_line() {
        let lines = collect("foo:1|c\nbar:2|c\n", &["^foo"]);
        assert_eq!(lines, vec!["foo:1|c\n"]);
    }

    #[test]
    fn test_unanchored_rule_matches_anywhere() {
        let lines = collect("a.foo.b:1|c\nbar:2|c", &["foo"]);
        assert_eq!(lines, vec!["a.foo.b:1|c\n"]);
    }

    #[test]
    fn test_empty_rules_emit_nothing() {
        let lines = collect("foo:1|c\nbar:2|c\n", &[]);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_multiple_rules_duplicate_line() {
        let lines = collect("foo.bar:1|c\n", &["foo", "bar"]);
        assert_eq!(lines, vec!["foo.bar:1|c\n", "foo.bar:1|c\n"]);
    }

    #[test]
    fn test_packet_order_preserved() {
        let lines = collect("x1:1|c\ny:2|c\nx2:3|c", &["^x", "^y"]);
        assert_eq!(lines, vec!["x1:1|c\n", "y:2|c\n", "x2:3|c\n"]);
    }

    #[test]
    fn test_trailing_empty_line_matches_catch_all() {
        let lines = collect("foo:1|c\n", &[".*"]);
        assert_eq!(lines, vec!["foo:1|c\n", "\n"]);
    }

    #[test]
    fn test_no_trimming() {
        let lines = collect(" foo:1|c \r\n", &["foo"]);
        assert_eq!(lines, vec![" foo:1|c \r\n"]);
    }

    #[test]
    fn test_emitted_count() {
        let rules = RuleSet::compile(&["c$"]).unwrap();
        let count = match_lines(b"a:1|c\nb:2|g\nc:3|c", &rules, |_| {});
        assert_eq!(count, 2);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let rules = RuleSet::compile(&["^ok"]).unwrap();
        let mut out = Vec::new();
        match_lines(b"ok:1|c\n\xff\xfe:2|c", &rules, |line| out.push(line));
        assert_eq!(out, vec![Bytes::from_static(b"ok:1|c\n")]);
    }
}
