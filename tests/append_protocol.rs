//! Append protocol scenarios: ordering, audit integrity, access rules.

use promptgate::config::ScanConfig;
use promptgate::rules::model::{RagMode, RuleAction, RuleScope, RuleSeverity};
use promptgate::rules::store::NewRule;
use promptgate::scan::ContextScorer;
use promptgate::{
    AppendConfig, ConversationAppender, ConversationStore, Error, MessageInputType, RuleStore,
    ScanEngine, StaticMembership,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

fn rule(key: &str, action: RuleAction, priority: i64, conditions: serde_json::Value) -> NewRule {
    NewRule {
        tenant_id: None,
        stable_key: key.to_string(),
        name: key.to_string(),
        description: None,
        scope: RuleScope::Prompt,
        conditions,
        conditions_version: 1,
        action,
        severity: RuleSeverity::High,
        priority,
        rag_mode: RagMode::Off,
        enabled: true,
    }
}

struct Fixture {
    appender: Arc<ConversationAppender>,
    store: Arc<ConversationStore>,
}

fn fixture(rules: Vec<NewRule>, membership: StaticMembership, config: AppendConfig) -> Fixture {
    let rule_store = RuleStore::open_in_memory().unwrap();
    for r in rules {
        rule_store.upsert(r).unwrap();
    }
    let engine = ScanEngine::new(
        Arc::new(rule_store),
        ContextScorer::empty(),
        ScanConfig::default(),
    )
    .unwrap();
    let store = Arc::new(ConversationStore::open_in_memory().unwrap());
    let appender = Arc::new(ConversationAppender::new(
        store.clone(),
        Arc::new(engine),
        Arc::new(membership),
        config,
    ));
    Fixture { appender, store }
}

fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[tokio::test]
async fn allowed_message_is_persisted_with_hash() {
    let f = fixture(Vec::new(), StaticMembership::new(), AppendConfig::default());
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, Some("chat".into()), None, None)
        .await
        .unwrap();

    let content = "My email is alice@example.com";
    let message = f
        .appender
        .append_user_message(c.id, user, content, MessageInputType::UserInput)
        .await
        .unwrap();

    assert_eq!(message.sequence_number, 1);
    assert_eq!(message.content.as_deref(), Some(content));
    assert_eq!(message.content_hash, sha256_hex(content));
    assert_eq!(message.final_action, Some(RuleAction::Allow));
    assert!(!message.blocked());
    assert!(message.latency_ms.is_some());

    let entities_json = message.entities_json.unwrap();
    assert_eq!(entities_json["entities"][0]["type"], "EMAIL");
    assert!(entities_json["signals"]["security"]["decision"].is_string());
}

#[tokio::test]
async fn blocked_message_persists_audit_row_then_signals_caller() {
    let f = fixture(
        vec![rule(
            "no-cccd",
            RuleAction::Block,
            100,
            json!({"any": [{"entity_type": "CCCD", "min_score": 0.8}]}),
        )],
        StaticMembership::new(),
        AppendConfig::default(),
    );
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    let content = "SĐT: 0987654321, CCCD: 012345678901";
    let err = f
        .appender
        .append_user_message(c.id, user, content, MessageInputType::UserInput)
        .await
        .unwrap_err();

    let Error::PolicyBlocked { message_id, rule } = err else {
        panic!("expected PolicyBlocked");
    };
    assert_eq!(rule.as_deref(), Some("no-cccd"));

    // the audit row was committed before the error surfaced
    let row = f.store.get_message(message_id).unwrap().unwrap();
    assert!(row.blocked());
    assert!(row.content.is_none());
    assert!(row.content_masked.is_none());
    assert_eq!(row.content_hash, sha256_hex(content));
    assert_eq!(row.sequence_number, 1);
    assert!(!row.matched_rule_ids.is_empty());

    // and the sequence was consumed
    let conversation = f.store.get_conversation(c.id).unwrap().unwrap();
    assert_eq!(conversation.last_sequence_number, 1);
}

#[tokio::test]
async fn masked_message_keeps_original_and_mask() {
    let f = fixture(
        vec![rule(
            "mask-contact",
            RuleAction::Mask,
            50,
            json!({"any": [{"entity_type": "EMAIL"}, {"entity_type": "PHONE"}]}),
        )],
        StaticMembership::new(),
        AppendConfig::default(),
    );
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    let content = "Contact: bob@acme.com; phone 0912 345 678";
    let message = f
        .appender
        .append_user_message(c.id, user, content, MessageInputType::UserInput)
        .await
        .unwrap();

    assert_eq!(message.final_action, Some(RuleAction::Mask));
    assert_eq!(message.content.as_deref(), Some(content));
    assert_eq!(
        message.content_masked.as_deref(),
        Some("Contact: [EMAIL]; phone [PHONE]")
    );
    assert_eq!(message.content_hash, sha256_hex(content));
}

#[tokio::test]
async fn mask_overlap_aborts_append_without_persisting() {
    // a contiguous 10-digit number is both PHONE and TAX_ID; when the
    // final action is mask, the colliding spans abort the append before
    // anything is written
    let f = fixture(
        vec![rule(
            "mask-phone",
            RuleAction::Mask,
            50,
            json!({"any": [{"entity_type": "PHONE"}]}),
        )],
        StaticMembership::new(),
        AppendConfig::default(),
    );
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    let err = f
        .appender
        .append_user_message(c.id, user, "call 0912345678 now", MessageInputType::UserInput)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MaskOverlap { .. }));

    // no row, no sequence consumed
    assert!(f.store.list_messages(c.id).unwrap().is_empty());
    assert_eq!(
        f.store
            .get_conversation(c.id)
            .unwrap()
            .unwrap()
            .last_sequence_number,
        0
    );
}

#[tokio::test]
async fn mask_can_null_content_by_config() {
    let f = fixture(
        vec![rule(
            "mask-contact",
            RuleAction::Mask,
            50,
            json!({"any": [{"entity_type": "EMAIL"}]}),
        )],
        StaticMembership::new(),
        AppendConfig {
            null_content_on_mask: true,
        },
    );
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    let message = f
        .appender
        .append_user_message(c.id, user, "mail a@b.co", MessageInputType::UserInput)
        .await
        .unwrap();

    assert!(message.content.is_none());
    assert_eq!(message.content_masked.as_deref(), Some("mail [EMAIL]"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_serialize_without_gaps() {
    let f = fixture(Vec::new(), StaticMembership::new(), AppendConfig::default());
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    // seed the log to last_sequence_number = 5
    for i in 0..5 {
        f.appender
            .append_user_message(
                c.id,
                user,
                &format!("warmup {}", i),
                MessageInputType::UserInput,
            )
            .await
            .unwrap();
    }

    let a = {
        let appender = f.appender.clone();
        let id = c.id;
        tokio::spawn(async move {
            appender
                .append_user_message(id, user, "writer A", MessageInputType::UserInput)
                .await
        })
    };
    let b = {
        let appender = f.appender.clone();
        let id = c.id;
        tokio::spawn(async move {
            appender
                .append_user_message(id, user, "writer B", MessageInputType::UserInput)
                .await
        })
    };

    let ma = a.await.unwrap().unwrap();
    let mb = b.await.unwrap().unwrap();

    let mut seqs = vec![ma.sequence_number, mb.sequence_number];
    seqs.sort();
    assert_eq!(seqs, vec![6, 7]);

    let messages = f.store.list_messages(c.id).unwrap();
    assert_eq!(messages.len(), 7);
    let all_seqs: Vec<i64> = messages.iter().map(|m| m.sequence_number).collect();
    assert_eq!(all_seqs, (1..=7).collect::<Vec<i64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_concurrent_writers_stay_dense() {
    let f = fixture(Vec::new(), StaticMembership::new(), AppendConfig::default());
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let appender = f.appender.clone();
        let id = c.id;
        handles.push(tokio::spawn(async move {
            appender
                .append_user_message(id, user, &format!("msg {}", i), MessageInputType::UserInput)
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let seqs: Vec<i64> = f
        .store
        .list_messages(c.id)
        .unwrap()
        .iter()
        .map(|m| m.sequence_number)
        .collect();
    assert_eq!(seqs, (1..=16).collect::<Vec<i64>>());
}

#[tokio::test]
async fn malformed_rule_persists_nothing() {
    let f = fixture(
        vec![rule(
            "bad",
            RuleAction::Block,
            1,
            json!({"signal": {"field": "x", "gt": 1}}),
        )],
        StaticMembership::new(),
        AppendConfig::default(),
    );
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    let err = f
        .appender
        .append_user_message(c.id, user, "aaa", MessageInputType::UserInput)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RuleMalformed { .. }));

    // no row, no sequence consumed
    assert!(f.store.list_messages(c.id).unwrap().is_empty());
    assert_eq!(
        f.store
            .get_conversation(c.id)
            .unwrap()
            .unwrap()
            .last_sequence_number,
        0
    );
}

#[tokio::test]
async fn foreign_user_gets_not_found() {
    let f = fixture(Vec::new(), StaticMembership::new(), AppendConfig::default());
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(owner, None, None, None)
        .await
        .unwrap();

    let err = f
        .appender
        .append_user_message(c.id, stranger, "hi", MessageInputType::UserInput)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.code(), "NOT_FOUND");

    let err = f.appender.list_messages(c.id, stranger).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn missing_conversation_gets_not_found() {
    let f = fixture(Vec::new(), StaticMembership::new(), AppendConfig::default());
    let err = f
        .appender
        .append_user_message(Uuid::new_v4(), Uuid::new_v4(), "hi", MessageInputType::UserInput)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn tenant_membership_rules() {
    let user = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let tenant = Uuid::new_v4();
    let f = fixture(
        Vec::new(),
        StaticMembership::new().with_member(user, tenant),
        AppendConfig::default(),
    );

    // non-member cannot create: surfaces as Forbidden on the create path
    let err = f
        .appender
        .create_tenant_conversation(outsider, tenant, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    // member creates, appends
    let c = f
        .appender
        .create_tenant_conversation(user, tenant, None, None, None)
        .await
        .unwrap();
    f.appender
        .append_user_message(c.id, user, "hello", MessageInputType::UserInput)
        .await
        .unwrap();

    // non-member access reads as NotFound, not Forbidden
    let err = f
        .appender
        .append_user_message(c.id, outsider, "hello", MessageInputType::UserInput)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn list_messages_in_sequence_order() {
    let f = fixture(Vec::new(), StaticMembership::new(), AppendConfig::default());
    let user = Uuid::new_v4();
    let c = f
        .appender
        .create_personal_conversation(user, None, None, None)
        .await
        .unwrap();

    for text in ["one", "two", "three"] {
        f.appender
            .append_user_message(c.id, user, text, MessageInputType::UserInput)
            .await
            .unwrap();
    }

    let messages = f.appender.list_messages(c.id, user).await.unwrap();
    let contents: Vec<&str> = messages
        .iter()
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
}
