use circuit_dispatch::ActionLike;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WardrobeAction {
    Dress,
    Undress,
    /// Follow-up dispatched by the socks store after undressing.
    Launder,
}

impl ActionLike for WardrobeAction {
    fn action_type(&self) -> &'static str {
        match self {
            WardrobeAction::Dress => "wardrobe:dress",
            WardrobeAction::Undress => "wardrobe:undress",
            WardrobeAction::Launder => "wardrobe:launder",
        }
    }
}
