use bruttus_common::Message;

/// Transcript lines included in the scope-analysis prompt.
pub const SCOPE_HISTORY_LINES: usize = 6;
/// Transcript lines included in the next-step prompt.
pub const NEXT_STEP_HISTORY_LINES: usize = 8;

/// Persona and operating constraints shared by every prompt.
pub const PERSONA: &str = "\
Você é BRUTTUS, parceiro de operação de bug bounty/pentest autorizado.
Estilo: curto, direto, humano. Foque em ação. Use jargão técnico só quando necessário.
Sempre que sugerir ferramenta, entregue COMANDO pronto (com placeholders).
Peça os resultados quando for relevante. Não repita o óbvio.
Reforce boas práticas legais/éticas e limites do escopo.";

/// Static replies used when no fused answer can be produced.
pub const SCOPE_CONTINGENCY_REPLY: &str = "Não consegui analisar com as IAs agora. Comece por recon: amass/subfinder + httpx; depois fuzz (ffuf/feroxbuster) e testes manuais no Burp. Me envie o que encontrar que seguimos.";
pub const NEXT_STEP_CONTINGENCY_REPLY: &str = "Falha temporária ao gerar a recomendação. Me diga qual comando rodou e o erro/output que ajusto o próximo passo com precisão.";

/// Format the last `n` messages as `<sender>: <text>` lines.
pub fn recent_history(messages: &[Message], n: usize) -> String {
    let start = messages.len().saturating_sub(n);
    messages[start..]
        .iter()
        .map(Message::history_line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_scope_analysis_prompt(scope: &str, history: &str) -> String {
    format!(
        "{PERSONA}

ESCOPO (resumo do usuário):
---
{scope}
---

Objetivo: analisar o escopo e montar um plano inicial de ataque RESPONSÁVEL e alinhado ao bug bounty.

Entregue APENAS:
1) \"Checklist rápido\" (3-6 itens) com foco nas áreas com mais ROI.
2) \"Ferramentas e comandos\" por etapa (enumere), usando placeholders como <alvo>, <dominio_raiz>, <arquivo>. Inclua **breve explicação do porquê** de cada comando.
3) \"Cuidados\" (2-4 bullets), incluindo limites e autorização.

Histórico (recente):
{history}
"
    )
}

pub fn build_next_step_prompt(scope: &str, user_message: &str, history: &str) -> String {
    format!(
        "{PERSONA}

Contexto do projeto:
{scope}

Mensagem do usuário (resultado/dúvida/erro/comando):
\"{user_message}\"

Histórico (recente):
{history}

Tarefa: proponha **apenas 1 ou 2 próximos passos**.
Para cada comando, entregue:
- Por quê (breve)
- Comando pronto (com placeholders)
- O que eu devo te enviar de volta (ex: output do nmap -sV ...)
Não envie vários comandos de uma vez sem explicação.
Aguarde que eu retorne o output antes de sugerir o próximo passo.
"
    )
}
