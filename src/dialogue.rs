//! Chat dialogue module for handling conversation state with users.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// Represents the conversation state for one chat
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum ChatDialogueState {
    #[default]
    Start,
    EditingMeal {
        meal_id: i64,
        report_message_id: i32, // ID of the analysis message to edit in place
        prompt_message_id: i32, // ID of the "describe the change" prompt to delete afterwards
    },
    AwaitingCalorieGoal,
    AwaitingTimezone {
        show_stats_after: bool, // Whether /stats triggered the timezone prompt
    },
}

/// Type alias for our chat dialogue
pub type ChatDialogue = Dialogue<ChatDialogueState, InMemStorage<ChatDialogueState>>;
