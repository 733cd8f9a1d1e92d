//! Ordering and adjacent-step merging for one recursion level's buffer.

use crate::ir::{OrderedStep, Step, StepSpec};

/// Stable sort by order id; entries with equal ids keep their walk order.
pub fn sort(mut entries: Vec<OrderedStep>) -> Vec<Step> {
    entries.sort_by_key(|entry| entry.order);
    entries.into_iter().map(|entry| entry.step).collect()
}

/// Sort a buffer and, when enabled, merge adjacent compatible script steps.
pub fn finalize(entries: Vec<OrderedStep>, merge: bool) -> Vec<Step> {
    let sorted = sort(entries);
    if merge { merge_adjacent(sorted) } else { sorted }
}

/// Fold each run of adjacent mergeable script steps into its first step.
///
/// Only neighbours are compared, so a non-script step between two
/// compatible scripts keeps them apart. Running this on its own output
/// changes nothing.
pub fn merge_adjacent(steps: Vec<Step>) -> Vec<Step> {
    let mut merged = Vec::with_capacity(steps.len());
    let mut current: Option<Step> = None;

    for step in steps {
        current = match current.take() {
            Some(mut head) if mergeable(&head, &step) => {
                absorb(&mut head, step);
                Some(head)
            }
            Some(head) => {
                merged.push(head);
                Some(step)
            }
            None => Some(step),
        };
    }
    merged.extend(current);
    merged
}

fn mergeable(a: &Step, b: &Step) -> bool {
    if a.timeout != b.timeout {
        return false;
    }
    match (&a.spec, &b.spec) {
        (StepSpec::Script(x), StepSpec::Script(y)) => x.same_runtime(y),
        _ => false,
    }
}

fn absorb(head: &mut Step, next: Step) {
    let Step { name, spec, .. } = next;
    if let (StepSpec::Script(script), StepSpec::Script(following)) = (&mut head.spec, spec) {
        script.run = format!("{}\n{}", script.run.trim_end_matches('\n'), following.run);
        head.name = format!("{}_{}", head.name, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{PluginSpec, ScriptSpec, Shell};

    fn script(id: &str, run: &str) -> Step {
        Step {
            id: id.into(),
            name: id.into(),
            spec: StepSpec::Script(ScriptSpec {
                shell: Some(Shell::Sh),
                run: run.into(),
                ..Default::default()
            }),
            timeout: None,
        }
    }

    fn plugin(id: &str) -> Step {
        Step {
            id: id.into(),
            name: id.into(),
            spec: StepSpec::Plugin(PluginSpec::new("plugins/junit")),
            timeout: None,
        }
    }

    fn runs(steps: &[Step]) -> Vec<&str> {
        steps
            .iter()
            .map(|s| s.as_script().map(|x| x.run.as_str()).unwrap_or("<plugin>"))
            .collect()
    }

    #[test]
    fn sort_is_stable_for_equal_ids() {
        let entries = vec![
            OrderedStep::new(2, script("c", "c")),
            OrderedStep::new(0, script("a", "a")),
            OrderedStep::new(0, script("b", "b")),
        ];
        let ids: Vec<_> = sort(entries).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn adjacent_scripts_merge() {
        let merged = merge_adjacent(vec![script("a", "echo a"), script("b", "echo b")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "a");
        assert_eq!(merged[0].name, "a_b");
        assert_eq!(runs(&merged), vec!["echo a\necho b"]);
    }

    #[test]
    fn non_script_breaks_adjacency() {
        let merged = merge_adjacent(vec![script("a", "1"), plugin("p"), script("b", "2")]);
        assert_eq!(runs(&merged), vec!["1", "<plugin>", "2"]);
    }

    #[test]
    fn different_runtime_does_not_merge() {
        let mut other = script("b", "2");
        if let StepSpec::Script(s) = &mut other.spec {
            s.image = Some("node:20".into());
        }
        assert_eq!(merge_adjacent(vec![script("a", "1"), other]).len(), 2);
    }

    #[test]
    fn different_timeout_does_not_merge() {
        let mut other = script("b", "2");
        other.timeout = Some("5m".into());
        assert_eq!(merge_adjacent(vec![script("a", "1"), other]).len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut windows = script("w", "dir");
        if let StepSpec::Script(s) = &mut windows.spec {
            s.shell = Some(Shell::Powershell);
        }
        let input = vec![
            script("a", "1"),
            script("b", "2"),
            windows,
            script("c", "3"),
            script("d", "4"),
        ];
        let once = merge_adjacent(input);
        let twice = merge_adjacent(once.clone());
        assert_eq!(once, twice);
        assert_eq!(runs(&once), vec!["1\n2", "dir", "3\n4"]);
    }

    #[test]
    fn finalize_without_merge_only_sorts() {
        let entries = vec![
            OrderedStep::new(1, script("b", "2")),
            OrderedStep::new(0, script("a", "1")),
        ];
        assert_eq!(runs(&finalize(entries, false)), vec!["1", "2"]);
    }
}
