//! Text spoken to callers and system prompts sent to the language model.

pub mod tts {
    pub const HELLO: &str = "Hello, I'm Amélie, the virtual assistant of your insurance company. \
        I can help you file a claim or answer your questions about an ongoing one. \
        How can I help you today?";
    pub const WELCOME_BACK: &str = "Welcome back, let's pick up where we left off.";
    pub const TIMEOUT_SILENCE: &str = "I'm sorry, I didn't hear anything. Are you still there?";
    pub const TIMEOUT_LOADING: &str = "It's taking me longer than expected to answer. \
        Thank you for your patience.";
    pub const GOODBYE: &str = "Thank you for calling, I hope I've been able to help. \
        You will receive a summary of our conversation by SMS. Goodbye!";
    pub const ERROR: &str = "I'm sorry, I have encountered an error. Could you repeat your request?";
    pub const END_CALL_TO_CONNECT_AGENT: &str =
        "Of course, stay on the line. I will transfer you to an agent.";
    pub const CALLTRANSFER_FAILURE: &str = "It seems I can't connect you with an agent at the \
        moment, but the next available agent will call you back as soon as possible.";
}

/// Sounds played from the public resources location.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sound {
    Loading,
    Ready,
}

impl Sound {
    pub fn url(&self, resources_public_url: &str) -> String {
        let file = match self {
            Sound::Loading => "loading.wav",
            Sound::Ready => "ready.wav",
        };
        format!("{}/{file}", resources_public_url.trim_end_matches('/'))
    }
}

pub fn default_system(date: &str, phone_number: &str) -> String {
    format!(
        "Assistant is called Amélie and is in a call center for an insurance company. \
         Assistant is an expert with 20 years of experience in handling claims. \
         Today is {date}. The customer is calling from {phone_number}. \
         Answers are read aloud by a text-to-speech engine: keep them short, \
         do not use lists, markdown or emojis, and spell out numbers."
    )
}

pub fn chat_system(claim: &str, reminders: &str) -> String {
    format!(
        "Assistant helps the customer file or follow an insurance claim. \
         Ask one question at a time and gather the information needed to complete the claim. \
         Use the tools to record every new piece of information as soon as it is known, \
         and to create reminders for anything that must be done later. \
         Never invent information the customer did not give. \
         Current claim: {claim}. \
         Current reminders: {reminders}."
    )
}

pub fn sms_summary_system(claim: &str, reminders: &str, conversation: &str) -> String {
    format!(
        "Assistant writes an SMS to the customer summarizing the call that just ended. \
         Include what was done, what is still missing, and the next steps. \
         Use at most 300 characters, plain text, no greeting formula. \
         Claim: {claim}. \
         Reminders: {reminders}. \
         Conversation: {conversation}."
    )
}
