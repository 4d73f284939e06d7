//! Sub-workflow reference graph checks.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigurationError;
use crate::id::TemplateId;

use super::WorkflowTemplate;

/// Verify that every template reachable from `candidate` exists and that
/// no reference chain leads back to a template already on the path.
///
/// `known` holds the persisted templates; `candidate` takes precedence
/// over any stored version with the same id, so an update is checked
/// against its new references.
///
/// # Errors
///
/// Returns [`ConfigurationError::UnknownTemplate`] for a dangling
/// reference and [`ConfigurationError::CyclicTemplate`] with the offending
/// path (first and last element equal) for a cycle.
pub fn check_references(
    candidate: &WorkflowTemplate,
    known: &HashMap<TemplateId, WorkflowTemplate>,
) -> Result<(), ConfigurationError> {
    let resolve = |id: TemplateId| {
        if id == candidate.id {
            Some(candidate)
        } else {
            known.get(&id)
        }
    };
    let mut path = vec![candidate.id];
    let mut done = HashSet::new();
    visit(candidate, &resolve, &mut path, &mut done)
}

fn visit<'a, F>(
    template: &'a WorkflowTemplate,
    resolve: &F,
    path: &mut Vec<TemplateId>,
    done: &mut HashSet<TemplateId>,
) -> Result<(), ConfigurationError>
where
    F: Fn(TemplateId) -> Option<&'a WorkflowTemplate>,
{
    for child_id in template.referenced_templates() {
        if let Some(start) = path.iter().position(|id| *id == child_id) {
            let mut cycle: Vec<String> = path[start..].iter().map(ToString::to_string).collect();
            cycle.push(child_id.to_string());
            return Err(ConfigurationError::CyclicTemplate(cycle));
        }
        if done.contains(&child_id) {
            continue;
        }
        let child = resolve(child_id)
            .ok_or_else(|| ConfigurationError::UnknownTemplate(child_id.to_string()))?;
        path.push(child_id);
        visit(child, resolve, path, done)?;
        path.pop();
        done.insert(child_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ActionSpec;
    use crate::workflow::WorkflowStep;

    fn template(id: TemplateId, children: &[TemplateId]) -> WorkflowTemplate {
        let mut builder = WorkflowTemplate::builder()
            .id(id)
            .name(format!("t-{id}"))
            .step(WorkflowStep::action(
                "ping",
                ActionSpec::SendNotification {
                    recipient: "r".into(),
                    message: "m".into(),
                },
            ));
        for child in children {
            builder = builder.step(WorkflowStep::action(
                "sub",
                ActionSpec::RunWorkflow {
                    template_id: *child,
                },
            ));
        }
        builder.build().unwrap()
    }

    fn store(templates: Vec<WorkflowTemplate>) -> HashMap<TemplateId, WorkflowTemplate> {
        templates.into_iter().map(|t| (t.id, t)).collect()
    }

    #[test]
    fn should_accept_diamond_shaped_references() {
        let (a, b, c, d) = (
            TemplateId::new(),
            TemplateId::new(),
            TemplateId::new(),
            TemplateId::new(),
        );
        let known = store(vec![template(b, &[d]), template(c, &[d]), template(d, &[])]);
        assert!(check_references(&template(a, &[b, c]), &known).is_ok());
    }

    #[test]
    fn should_reject_self_reference() {
        let a = TemplateId::new();
        let result = check_references(&template(a, &[a]), &HashMap::new());
        assert_eq!(
            result,
            Err(ConfigurationError::CyclicTemplate(vec![
                a.to_string(),
                a.to_string()
            ]))
        );
    }

    #[test]
    fn should_reject_cycle_introduced_by_update() {
        let (a, b, c) = (TemplateId::new(), TemplateId::new(), TemplateId::new());
        // stored: a -> b -> c ; update c to point back at a
        let known = store(vec![template(a, &[b]), template(b, &[c]), template(c, &[])]);
        let result = check_references(&template(c, &[a]), &known);
        assert_eq!(
            result,
            Err(ConfigurationError::CyclicTemplate(vec![
                c.to_string(),
                a.to_string(),
                b.to_string(),
                c.to_string()
            ]))
        );
    }

    #[test]
    fn should_reject_dangling_reference() {
        let (a, missing) = (TemplateId::new(), TemplateId::new());
        let result = check_references(&template(a, &[missing]), &HashMap::new());
        assert_eq!(
            result,
            Err(ConfigurationError::UnknownTemplate(missing.to_string()))
        );
    }
}
