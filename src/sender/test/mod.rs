
mod state_abort;
mod state_expect_100;
mod state_ordering;
