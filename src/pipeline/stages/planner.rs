//! Planner stage: converge the conversation into a candidate plan
//!
//! Runs only once the conversation is known to satisfy readiness. The model
//! is instructed to emit the plan in the compact protocol; the response is
//! decoded through the codec and the plan converter. Decode failure aborts
//! the turn with a user-facing error; there is no silent fallback to a
//! prior plan.

use tracing::{debug, info};

use crate::model::{self, ChatMessage, ChatRequest};
use crate::pipeline::StageContext;
use crate::plan::Plan;
use crate::protocol;
use crate::state::{SessionState, Stage, StageDelta, StageOutcome};
use crate::{Error, Result};

pub async fn run(state: &SessionState, ctx: &StageContext) -> Result<StageOutcome> {
    let mut messages = vec![ChatMessage::system(system_prompt(ctx))];
    messages.extend(state.messages.iter().cloned());

    let request = ChatRequest::new(ctx.config.model.model.clone(), messages);
    let response = model::collect(ctx.model.send(request).await?).await?;

    let text = protocol::strip_fences(&response.text);
    debug!(chars = text.len(), "decoding planner response");

    let document = protocol::parse(text)
        .map_err(|e| Error::PlanDecode(format!("planner response was not a valid document: {}", e)))?;
    let plan = Plan::from_document(&document)?;

    info!(
        title = %plan.title,
        nodes = plan.workflow.nodes.len(),
        "planner produced a candidate plan"
    );

    Ok(StageOutcome {
        delta: StageDelta {
            messages: vec![ChatMessage::assistant(response.text.clone())],
            plan: Some(plan),
            ..Default::default()
        },
        next_hint: Some(Stage::Validator),
    })
}

fn system_prompt(ctx: &StageContext) -> String {
    format!(
        "Design the automation workflow the conversation converged on, and \
         emit it as a plan in this compact format (two-space indent, no \
         quoting, `- ` for list items):\n\
         \n\
         title: <short title>\n\
         summary: <one-sentence summary>\n\
         workflow:\n\
         \x20\x20name: <workflow name>\n\
         \x20\x20nodes:\n\
         \x20\x20\x20\x20- name: <unique node name>\n\
         \x20\x20\x20\x20\x20\x20type: <node type from the list below>\n\
         \x20\x20\x20\x20\x20\x20parameters:\n\
         \x20\x20\x20\x20\x20\x20\x20\x20<key>: <value>\n\
         \x20\x20connections:\n\
         \x20\x20\x20\x20<source node name>:\n\
         \x20\x20\x20\x20\x20\x20main:\n\
         \x20\x20\x20\x20\x20\x20\x20\x20- node: <target node name>\n\
         \x20\x20\x20\x20\x20\x20\x20\x20\x20\x20type: main\n\
         \x20\x20\x20\x20\x20\x20\x20\x20\x20\x20index: 0\n\
         credentialsNeeded:\n\
         \x20\x20- type: <credential type>\n\
         \x20\x20\x20\x20nodeName: <node that needs it>\n\
         \n\
         Valid node types:\n{}\n\
         \n\
         Emit only the document. No prose before or after it.",
        ctx.node_types.prompt_listing()
    )
}

#[cfg(test)]
mod tests {
    use crate::plan::Plan;
    use crate::protocol;

    // The decode path the stage relies on, end to end over protocol text
    #[test]
    fn test_protocol_text_decodes_to_plan() {
        let text = "\
title: Daily Report
summary: Posts a report
workflow:
  name: Daily Report
  nodes:
    - name: Schedule
      type: scheduleTrigger
    - name: Slack
      type: slack
  connections:
    Schedule:
      main:
        - node: Slack
          type: main
          index: 0
";
        let doc = protocol::parse(text).unwrap();
        let plan = Plan::from_document(&doc).unwrap();
        assert_eq!(plan.workflow.nodes.len(), 2);
        assert_eq!(
            plan.workflow.connections["Schedule"]["main"][0][0].node,
            "Slack"
        );
    }

    #[test]
    fn test_fenced_response_decodes() {
        let text = "Here you go:\n```\ntitle: X\nworkflow:\n  name: X\n  nodes:\n    - name: A\n      type: t\n```";
        let doc = protocol::parse(protocol::strip_fences(text)).unwrap();
        assert!(Plan::from_document(&doc).is_ok());
    }
}
