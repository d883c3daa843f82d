//! Conversation state tests: storage transitions and state serialization.
//! These run without a database or network.

use anyhow::Result;
use nutrilog::dialogue::{ChatDialogue, ChatDialogueState};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::types::ChatId;

#[tokio::test]
async fn test_dialogue_defaults_to_start() -> Result<()> {
    let storage = InMemStorage::<ChatDialogueState>::new();
    let dialogue = ChatDialogue::new(storage, ChatId(1));

    let state = dialogue.get_or_default().await?;
    assert!(matches!(state, ChatDialogueState::Start));

    Ok(())
}

#[tokio::test]
async fn test_dialogue_edit_flow_transitions() -> Result<()> {
    let storage = InMemStorage::<ChatDialogueState>::new();
    let dialogue = ChatDialogue::new(storage, ChatId(2));

    dialogue
        .update(ChatDialogueState::EditingMeal {
            meal_id: 42,
            report_message_id: 100,
            prompt_message_id: 101,
        })
        .await?;

    match dialogue.get().await? {
        Some(ChatDialogueState::EditingMeal {
            meal_id,
            report_message_id,
            prompt_message_id,
        }) => {
            assert_eq!(meal_id, 42);
            assert_eq!(report_message_id, 100);
            assert_eq!(prompt_message_id, 101);
        }
        other => panic!("unexpected dialogue state: {other:?}"),
    }

    dialogue.exit().await?;
    assert!(dialogue.get().await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_dialogues_are_isolated_per_chat() -> Result<()> {
    let storage = InMemStorage::<ChatDialogueState>::new();
    let first = ChatDialogue::new(storage.clone(), ChatId(3));
    let second = ChatDialogue::new(storage, ChatId(4));

    first
        .update(ChatDialogueState::AwaitingCalorieGoal)
        .await?;

    assert!(matches!(
        first.get().await?,
        Some(ChatDialogueState::AwaitingCalorieGoal)
    ));
    assert!(second.get().await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_timezone_state_remembers_stats_intent() -> Result<()> {
    let storage = InMemStorage::<ChatDialogueState>::new();
    let dialogue = ChatDialogue::new(storage, ChatId(5));

    dialogue
        .update(ChatDialogueState::AwaitingTimezone {
            show_stats_after: true,
        })
        .await?;

    assert!(matches!(
        dialogue.get().await?,
        Some(ChatDialogueState::AwaitingTimezone {
            show_stats_after: true
        })
    ));

    Ok(())
}

#[test]
fn test_state_serialization_round_trip() {
    let state = ChatDialogueState::EditingMeal {
        meal_id: 7,
        report_message_id: 8,
        prompt_message_id: 9,
    };

    let json = serde_json::to_string(&state).unwrap();
    let back: ChatDialogueState = serde_json::from_str(&json).unwrap();

    assert!(matches!(
        back,
        ChatDialogueState::EditingMeal {
            meal_id: 7,
            report_message_id: 8,
            prompt_message_id: 9,
        }
    ));
}
