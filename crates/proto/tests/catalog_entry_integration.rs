use proto::{Message, MessageId, MessageStatus, ModelCatalogEntry, NewMessage, Sender};

#[test]
fn catalog_entry_cache_payload_contract() {
    let entries = vec![
        ModelCatalogEntry {
            id: "openai/gpt-4o-mini".to_string(),
            name: "GPT-4o mini".to_string(),
            context_length: 128_000,
            supported_parameters: vec!["tools".to_string(), "temperature".to_string()],
            ..Default::default()
        },
        ModelCatalogEntry {
            id: "meta-llama/llama-3.1-8b-instruct".to_string(),
            ..Default::default()
        },
    ];

    let serialized = serde_json::to_string(&entries).expect("serialize entries");
    let parsed: Vec<ModelCatalogEntry> =
        serde_json::from_str(&serialized).expect("deserialize entries");

    assert_eq!(parsed, entries);
    assert!(parsed[0].supports("tools"));
    assert_eq!(parsed[1].display_name(), "meta-llama/llama-3.1-8b-instruct");
}

#[test]
fn stored_message_serializes_sender_and_status_lowercase() {
    let msg = Message::from_new(MessageId(1), NewMessage::assistant("Hello"));
    let value = serde_json::to_value(&msg).expect("serialize message");

    assert_eq!(value["sender"], "assistant");
    assert_eq!(value["status"], "delivered");
    assert_eq!(value["id"], 1);

    let back: Message = serde_json::from_value(value).expect("deserialize message");
    assert_eq!(back.sender, Sender::Assistant);
    assert_eq!(back.status, MessageStatus::Delivered);
}
