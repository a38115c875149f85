//! End-to-end agent-loop scenarios against the in-memory host and a
//! scripted model: the simple-fix happy path, crash resumption with replay,
//! input-error surfacing, and the fatal stop reasons.

mod support;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cobbler::agent::{Agent, AgentConfig};
use cobbler::bot::labels;
use cobbler::conversation::store::HistoryStore;
use cobbler::conversation::{History, Turn};
use cobbler::github::GithubApi;
use cobbler::llm::{
    AssistantResponse, ContentBlock, LlmClient, MockLlm, StopReason, Usage,
};
use cobbler::task::{build_task, Task};
use cobbler::tools::ToolRegistry;
use cobbler::validate::{CommitValidator, ValidationError};
use support::{sample_issue, AlwaysPassValidator, FakeGithub};

struct Harness {
    llm: Arc<MockLlm>,
    agent: Agent,
    store_probe: HistoryStore,
    _dir: tempfile::TempDir,
}

fn harness(api: Arc<FakeGithub>, responses: Vec<AssistantResponse>) -> Harness {
    harness_with(api, responses, AgentConfig::default())
}

fn harness_with(
    api: Arc<FakeGithub>,
    responses: Vec<AssistantResponse>,
    config: AgentConfig,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlm::scripted(responses));
    let agent = Agent::new(
        Arc::clone(&api) as Arc<dyn GithubApi>,
        Arc::clone(&llm) as Arc<dyn LlmClient>,
        Arc::new(AlwaysPassValidator::default()) as Arc<dyn CommitValidator>,
        HistoryStore::new(dir.path()),
        ToolRegistry::standard(),
        "bot",
        config,
    );
    Harness {
        llm,
        agent,
        store_probe: HistoryStore::new(dir.path()),
        _dir: dir,
    }
}

async fn task_for(api: &FakeGithub, number: u64, title: &str) -> Task {
    build_task(api, "bot", sample_issue(number, title))
        .await
        .unwrap()
}

#[tokio::test]
async fn new_issue_simple_fix_end_to_end() {
    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("README.md", "Ths is the readme.")]);
    let h = harness(
        Arc::clone(&api),
        vec![
            MockLlm::tool_response(vec![(
                "t1",
                "text_editor",
                serde_json::json!({
                    "command": "str_replace",
                    "path": "README.md",
                    "old_str": "Ths",
                    "new_str": "This"
                }),
            )]),
            MockLlm::tool_response(vec![(
                "t2",
                "validate_changes",
                serde_json::json!({ "commit_message": "Fix typo in README" }),
            )]),
            MockLlm::tool_response(vec![(
                "t3",
                "publish_changes_for_review",
                serde_json::json!({ "title": "Fix typo in README", "body": "Fixes #42" }),
            )]),
            MockLlm::text_response("Fixed the typo and opened a pull request."),
        ],
    );

    let mut task = task_for(&api, 42, "Fix typo in README").await;
    // The bot applied bot-turn before handing over; natural end removes it.
    api.lock()
        .issue_labels
        .entry(42)
        .or_default()
        .insert(labels::TURN.name.to_string());

    h.agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap();

    // Branches exist; the work branch carries exactly one commit on top of
    // the seed, and the review branch received it.
    assert_eq!(api.history_len("wip/issue-42-fix-typo-in-readme"), 2);
    assert_eq!(
        api.file_at("fix/issue-42-fix-typo-in-readme", "README.md")
            .as_deref(),
        Some("This is the readme.")
    );

    // Exactly one PR from the review branch into the default branch.
    let pulls = api.lock().pulls.clone();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].0, "fix/issue-42-fix-typo-in-readme");
    assert_eq!(pulls[0].1.base_branch, "main");

    // Natural end: conversation deleted, bot-turn removed.
    assert!(h.store_probe.load(42).unwrap().is_none());
    assert!(!api.issue_has_label(42, labels::TURN.name));

    // The model saw truthful opening context.
    let first = &h.llm.requests()[0];
    assert_eq!(first.messages.len(), 1);
    assert_eq!(first.messages[0].content.len(), 2);

    assert_eq!(h.llm.remaining(), 0);
}

#[tokio::test]
async fn resume_replays_local_effects_and_never_remote_ones() {
    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("a.txt", "alpha OLD"), ("b.txt", "beta OLD")]);
    let h = harness(
        Arc::clone(&api),
        vec![
            MockLlm::tool_response(vec![(
                "tv",
                "validate_changes",
                serde_json::json!({ "commit_message": "apply edits" }),
            )]),
            MockLlm::text_response("Done."),
        ],
    );

    // Persisted conversation from before the crash: an acknowledged
    // post_comment, then an assistant response with two edits whose results
    // were never recorded.
    let edit = |id: &str, path: &str| ContentBlock::ToolUse {
        id: id.to_string(),
        name: "text_editor".to_string(),
        input: serde_json::json!({
            "command": "str_replace",
            "path": path,
            "old_str": "OLD",
            "new_str": "NEW"
        }),
    };
    let history = History {
        system_prompt: "persisted system prompt".to_string(),
        turns: vec![
            Turn {
                user: vec![ContentBlock::text("initial context")],
                assistant: Some(AssistantResponse {
                    content: vec![ContentBlock::ToolUse {
                        id: "t0".to_string(),
                        name: "post_comment".to_string(),
                        input: serde_json::json!({ "target": "issue", "body": "on it" }),
                    }],
                    stop_reason: StopReason::ToolUse,
                    usage: Usage::default(),
                }),
            },
            Turn {
                user: vec![ContentBlock::tool_result("t0", "Commented on issue #7.")],
                assistant: Some(AssistantResponse {
                    content: vec![edit("ta", "a.txt"), edit("tb", "b.txt")],
                    stop_reason: StopReason::ToolUse,
                    usage: Usage::default(),
                }),
            },
        ],
    };
    h.store_probe.save(7, &history).unwrap();

    let mut task = task_for(&api, 7, "Apply the rename").await;
    h.agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap();

    // Both recorded edits were dispatched live and committed.
    assert_eq!(
        api.file_at("wip/issue-7-apply-the-rename", "a.txt").as_deref(),
        Some("alpha NEW")
    );
    assert_eq!(
        api.file_at("wip/issue-7-apply-the-rename", "b.txt").as_deref(),
        Some("beta NEW")
    );

    // The replayed post_comment was NOT re-executed.
    assert!(api.comments_on(7).is_empty());

    assert!(h.store_probe.load(7).unwrap().is_none());
}

#[tokio::test]
async fn resume_with_pending_user_turn_resends_it() {
    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("a.txt", "x")]);
    let h = harness(
        Arc::clone(&api),
        vec![MockLlm::text_response("Nothing left to do.")],
    );

    let history = History {
        system_prompt: "sys".to_string(),
        turns: vec![Turn {
            user: vec![ContentBlock::text("crashed before the response landed")],
            assistant: None,
        }],
    };
    h.store_probe.save(9, &history).unwrap();

    let mut task = task_for(&api, 9, "Recover").await;
    h.agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap();

    let requests = h.llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, "sys");
    assert_eq!(
        requests[0].messages[0].content,
        vec![ContentBlock::text("crashed before the response landed")]
    );
    assert!(h.store_probe.load(9).unwrap().is_none());
}

#[tokio::test]
async fn ambiguous_str_replace_surfaces_an_input_error_to_the_model() {
    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("code.txt", "x = 1\nx = 2\n")]);
    let h = harness(
        Arc::clone(&api),
        vec![
            MockLlm::tool_response(vec![(
                "t1",
                "text_editor",
                serde_json::json!({
                    "command": "str_replace",
                    "path": "code.txt",
                    "old_str": "x",
                    "new_str": "y"
                }),
            )]),
            MockLlm::text_response("Giving up politely."),
        ],
    );

    let mut task = task_for(&api, 8, "Rename x").await;
    h.agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap();

    // No write happened: the work branch still has the seed commit only.
    assert_eq!(api.history_len("wip/issue-8-rename-x"), 1);
    assert_eq!(
        api.file_at("wip/issue-8-rename-x", "code.txt").as_deref(),
        Some("x = 1\nx = 2\n")
    );

    // The model got the error as an is_error tool result.
    let requests = h.llm.requests();
    let followup = &requests[1].messages.last().unwrap().content[0];
    match followup {
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            assert_eq!(tool_use_id, "t1");
            assert!(*is_error);
            assert_eq!(content, "old_str found 2 times in file, must be unique");
        }
        other => panic!("expected a tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_stop_reason_is_fatal_and_preserves_the_conversation() {
    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("a", "a")]);
    let truncated = AssistantResponse {
        content: vec![ContentBlock::text("…")],
        stop_reason: StopReason::MaxTokens,
        usage: Usage::default(),
    };
    let h = harness(Arc::clone(&api), vec![truncated]);

    let mut task = task_for(&api, 11, "Too big").await;
    let err = h
        .agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("MaxTokens"), "{err}");
    assert!(h.store_probe.load(11).unwrap().is_some(), "history kept for inspection");
}

#[tokio::test]
async fn iteration_cap_is_fatal() {
    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("a.txt", "content")]);
    let view = || {
        MockLlm::tool_response(vec![(
            "t",
            "text_editor",
            serde_json::json!({ "command": "view", "path": "a.txt" }),
        )])
    };
    let h = harness_with(
        Arc::clone(&api),
        vec![view(), view(), view()],
        AgentConfig {
            max_iterations: 2,
            summarize_threshold: 0,
        },
    );

    let mut task = task_for(&api, 12, "Loop forever").await;
    let err = h
        .agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("iteration limit"), "{err}");
}

#[tokio::test]
async fn validation_timeout_at_open_is_fatal() {
    struct TimeoutValidator;

    #[async_trait::async_trait]
    impl CommitValidator for TimeoutValidator {
        async fn validate(
            &self,
            _owner: &str,
            _repo: &str,
            _sha: &str,
        ) -> Result<cobbler::validate::ValidationOutcome, ValidationError> {
            Err(ValidationError::Timeout(std::time::Duration::from_secs(
                2700,
            )))
        }
    }

    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("a", "a")]);
    let dir = tempfile::tempdir().unwrap();
    let agent = Agent::new(
        Arc::clone(&api) as Arc<dyn GithubApi>,
        Arc::new(MockLlm::scripted(vec![])) as Arc<dyn LlmClient>,
        Arc::new(TimeoutValidator) as Arc<dyn CommitValidator>,
        HistoryStore::new(dir.path()),
        ToolRegistry::standard(),
        "bot",
        AgentConfig::default(),
    );

    let mut task = task_for(&api, 13, "Slow checks").await;
    let err = agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
}

#[tokio::test]
async fn summarization_rewrites_history_and_continues() {
    let api = Arc::new(FakeGithub::new("bot"));
    api.seed_repo(&[("a.txt", "content")]);
    let view = |id: &str| {
        MockLlm::tool_response(vec![(
            id,
            "text_editor",
            serde_json::json!({ "command": "view", "path": "a.txt" }),
        )])
    };
    // Usage of 100 input tokens per response; threshold 250 trips after the
    // third response with more than two turns on the books.
    let h = harness_with(
        Arc::clone(&api),
        vec![
            view("t1"),
            view("t2"),
            view("t3"),
            MockLlm::text_response("the summary of work so far"),
            MockLlm::text_response("done after summary"),
        ],
        AgentConfig {
            max_iterations: 50,
            summarize_threshold: 250,
        },
    );

    let mut task = task_for(&api, 20, "Summarize me").await;
    h.agent
        .run_task(&mut task, &CancellationToken::new())
        .await
        .unwrap();

    let requests = h.llm.requests();
    // The summary request carries the tool results plus the request text.
    let summary_request = &requests[3].messages.last().unwrap().content;
    assert!(summary_request
        .iter()
        .any(|b| matches!(b, ContentBlock::Text { text } if text.contains("Summarize"))));
    // The request after the rewrite is three turns: first, summary, resume.
    let resumed = &requests[4];
    assert_eq!(resumed.messages.len(), 5);
    let last = resumed.messages.last().unwrap();
    assert!(matches!(
        &last.content[0],
        ContentBlock::Text { text } if text.contains("Continue")
    ));
    assert!(h.store_probe.load(20).unwrap().is_none());
}
