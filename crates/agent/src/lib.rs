//! The agent loop: streams a model response, narrates it, runs the tool it
//! asks for and feeds the result back until the model finishes.
//!
//! One turn goes:
//!
//! 1. **Build context** (system prompt + session history + the question)
//! 2. **Stream** the model's JSON reply through [`StreamParser`]
//! 3. **If an action**: dispatch the tool, append the result, loop back to 2
//! 4. **If a finish**: emit the answer and record it in the session
//!
//! The loop stops at the answer, on a backend error, or at the iteration
//! ceiling, whichever comes first.

pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod stream_event;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use loop_runner::{AgentLoop, ChatRequest, TurnOutcome};
pub use parser::{ActionRequest, Field, StreamParser};
pub use session::{
    AgentLoopRecord, EvictionPolicy, IdleTimeout, KeepForever, SessionContext, SessionHandle,
    SessionStore,
};
pub use stream_event::{EventEncoder, StreamEvent};
