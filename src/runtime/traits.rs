//! Presentation seam for the interaction loop

use crate::llm::Role;

/// Output surface. Only the interaction loop calls it, from its own task.
pub trait Presentation: Send {
    /// Append one finished turn
    fn render_turn(&mut self, role: Role, content: &str);

    /// Drop everything shown; a freshly loaded conversation follows
    fn clear(&mut self, conversation_id: &str);

    /// Informational text that is not part of the conversation
    fn notice(&mut self, text: &str);
}
