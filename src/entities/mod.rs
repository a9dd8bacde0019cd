pub mod order_ticket_group;
pub mod order_ticket_info;
pub mod ticket_group;
pub mod ticket_variant;
