mod args;
mod event;
mod interrupt;
mod thread;

pub use args::{
    ArgsError, CalendarEventArgs, DelegateArgs, DoneArgs, QuestionArgs, SearchArgs, SendMailArgs,
    ToolArgs,
};
pub use event::{
    result_text, DonePayload, ErrorPayload, InterruptPayload, MessagePayload, RunRequest,
    StartPayload, StreamRequest, SubAgentResultPayload, SubAgentStartPayload, ToolCallPayload,
    ToolResultPayload,
};
pub use interrupt::{ActionRequest, HumanInterrupt, HumanResponse, InterruptConfig, ResponseKind};
pub use thread::{
    DoneAnswer, Message, RunResponse, Thread, ThreadDetail, ThreadStatus, ToolCall,
    DONE_TOOL_NAME,
};
