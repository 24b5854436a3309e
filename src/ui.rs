//! Server-rendered page shell.
//!
//! The page is static HTML plus a small script. All conversation state lives
//! on the server; the script renders the snapshot it receives over SSE and
//! applies the incremental transcript events that follow.

/// Generate the HTML shell for the application.
fn html_shell(title: &str, styles: &str, content: &str, script: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en" class="dark">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="description" content="Streaming LLM chat">
    <title>{title} - FlashChat</title>
    <style>{styles}</style>
</head>
<body>
    {content}
    <script>{script}</script>
</body>
</html>"#
    )
}

/// The chat page.
#[must_use]
pub fn index_page() -> String {
    html_shell("Chat", STYLES, CHAT_CONTENT, CHAT_SCRIPT)
}

const STYLES: &str = r"
* { box-sizing: border-box; }
body { margin: 0; font-family: system-ui, sans-serif; background: #0f172a; color: #e2e8f0; }
.shell { display: flex; flex-direction: column; height: 100vh; max-width: 56rem; margin: 0 auto; padding: 0 1rem; }
header { display: flex; align-items: center; justify-content: space-between; padding: 1.5rem 0; border-bottom: 1px solid #1e293b; }
header h1 { margin: 0; font-size: 1.25rem; }
header p { margin: 0; font-size: 0.7rem; color: #94a3b8; text-transform: uppercase; letter-spacing: 0.05em; }
button { cursor: pointer; border: 0; border-radius: 0.75rem; padding: 0.6rem 1rem; background: #4f46e5; color: #fff; }
button:disabled { opacity: 0.5; cursor: not-allowed; }
#clear { background: transparent; color: #94a3b8; }
#turns { flex: 1; overflow-y: auto; padding: 2rem 0; display: flex; flex-direction: column; gap: 1.5rem; }
.empty { margin: auto; text-align: center; opacity: 0.5; }
.turn { display: flex; flex-direction: column; max-width: 75%; }
.turn.user { align-self: flex-end; align-items: flex-end; }
.turn.assistant { align-self: flex-start; align-items: flex-start; }
.bubble { padding: 0.75rem 1rem; border-radius: 1rem; font-size: 0.9rem; line-height: 1.5; white-space: pre-wrap; }
.user .bubble { background: #4f46e5; color: #fff; border-top-right-radius: 0; }
.assistant .bubble { background: #1e293b; border: 1px solid #334155; border-top-left-radius: 0; }
.time { font-size: 0.65rem; color: #64748b; margin-top: 0.25rem; }
.error { color: #fca5a5; font-style: italic; }
.dots span { display: inline-block; width: 6px; height: 6px; margin-right: 3px; border-radius: 50%; background: #818cf8; animation: bounce 1s infinite; }
.dots span:nth-child(2) { animation-delay: 0.15s; }
.dots span:nth-child(3) { animation-delay: 0.3s; }
@keyframes bounce { 0%, 100% { transform: translateY(0); } 50% { transform: translateY(-4px); } }
form { display: flex; gap: 0.5rem; padding: 1.5rem 0; }
#input { flex: 1; padding: 1rem; border-radius: 1rem; border: 1px solid #334155; background: #1e293b; color: #fff; }
#input:disabled { opacity: 0.5; }
";

const CHAT_CONTENT: &str = r#"
<div class="shell">
    <header>
        <div>
            <h1>FlashChat</h1>
            <p>Streaming responses</p>
        </div>
        <button id="clear" type="button" title="Clear chat">Clear</button>
    </header>
    <main id="turns"></main>
    <form id="composer">
        <input id="input" type="text" placeholder="Ask anything..." autocomplete="off">
        <button id="send" type="submit" disabled>Send</button>
    </form>
</div>
"#;

const CHAT_SCRIPT: &str = r#"
const state = { sessionId: null, turns: [], loading: false, error: null };
const els = {
    turns: document.getElementById('turns'),
    form: document.getElementById('composer'),
    input: document.getElementById('input'),
    send: document.getElementById('send'),
    clear: document.getElementById('clear'),
};

function formatTime(iso) {
    return new Date(iso).toLocaleTimeString([], { hour: '2-digit', minute: '2-digit' });
}

function renderTurn(turn) {
    const wrap = document.createElement('div');
    wrap.className = 'turn ' + turn.role;
    const bubble = document.createElement('div');
    bubble.className = 'bubble';
    if (turn.content) {
        bubble.textContent = turn.content;
    } else if (turn.role === 'assistant' && !state.error) {
        bubble.innerHTML = '<span class="dots"><span></span><span></span><span></span></span>';
    } else if (turn.role === 'assistant' && state.error) {
        const p = document.createElement('p');
        p.className = 'error';
        p.textContent = state.error;
        bubble.appendChild(p);
    }
    const time = document.createElement('span');
    time.className = 'time';
    time.textContent = formatTime(turn.created_at);
    wrap.append(bubble, time);
    return wrap;
}

function render() {
    els.turns.replaceChildren();
    if (state.turns.length === 0) {
        const empty = document.createElement('div');
        empty.className = 'empty';
        empty.innerHTML = '<p>No messages yet</p><p>Start a conversation.</p>';
        els.turns.appendChild(empty);
    } else {
        for (const turn of state.turns) {
            els.turns.appendChild(renderTurn(turn));
        }
    }
    els.input.disabled = state.loading;
    els.send.disabled = state.loading || !els.input.value.trim();
    els.turns.scrollTop = els.turns.scrollHeight;
}

const handlers = {
    'snapshot': (s) => { state.turns = s.turns; state.loading = s.loading; state.error = s.error; },
    'turn.appended': (d) => { state.turns.push(d.turn); },
    'turn.delta': (d) => {
        const turn = state.turns.find((t) => t.id === d.turn_id);
        if (turn) { turn.content += d.text; }
    },
    'generation.started': () => { state.loading = true; state.error = null; },
    'generation.done': () => { state.loading = false; },
    'generation.error': (d) => { state.loading = false; state.error = d.message; },
    'transcript.cleared': () => { state.turns = []; state.error = null; },
};

async function ensureSession() {
    const saved = sessionStorage.getItem('flashchat.session');
    if (saved) {
        const res = await fetch('/api/sessions/' + saved);
        if (res.ok) { return saved; }
    }
    const res = await fetch('/api/sessions', { method: 'POST' });
    const info = await res.json();
    sessionStorage.setItem('flashchat.session', info.id);
    return info.id;
}

function connect() {
    const source = new EventSource('/api/sessions/' + state.sessionId + '/events');
    for (const [name, apply] of Object.entries(handlers)) {
        source.addEventListener(name, (e) => {
            apply(JSON.parse(e.data).data);
            render();
        });
    }
    source.onerror = () => {
        if (source.readyState === EventSource.CLOSED) { start(); }
    };
}

async function start() {
    state.sessionId = await ensureSession();
    connect();
}

els.input.addEventListener('input', render);

els.form.addEventListener('submit', async (e) => {
    e.preventDefault();
    const text = els.input.value;
    if (!text.trim() || state.loading) { return; }
    els.input.value = '';
    await fetch('/api/sessions/' + state.sessionId + '/messages', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ text }),
    });
});

els.clear.addEventListener('click', async () => {
    await fetch('/api/sessions/' + state.sessionId + '/messages', { method: 'DELETE' });
});

render();
start();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_page_has_controls() {
        let page = index_page();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(r#"id="input""#));
        assert!(page.contains(r#"id="clear""#));
        assert!(page.contains("/events"));
    }
}
