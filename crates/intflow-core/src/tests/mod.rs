mod invariants;
mod taint_flow;
