//! Fixed prompt texts sent to the language model.
//!
//! Essays are Portuguese ENEM submissions, so every prompt is written in
//! Portuguese.

pub const CORRECTION_SYSTEM: &str = "Iniciar correção da redação";
pub const EVALUATION_SYSTEM: &str = "Iniciar avaliação da redação";
pub const SCORING_SYSTEM: &str = "Iniciar atribuição de nota da redação";
pub const DETECTION_SYSTEM: &str = "Iniciar análise de autoria da redação";

/// The five ENEM competencies, in rubric order.
pub const COMPETENCIES: [&str; 5] = [
    "Competência 1: Demonstrar domínio da modalidade escrita formal da língua portuguesa.",
    "Competência 2: Compreender a proposta de redação e aplicar conceitos das várias áreas de \
     conhecimento para desenvolver o tema, dentro dos limites estruturais do texto \
     dissertativo-argumentativo em prosa.",
    "Competência 3: Selecionar, relacionar, organizar e interpretar informações, fatos, opiniões \
     e argumentos em defesa de um ponto de vista.",
    "Competência 4: Demonstrar conhecimento dos mecanismos linguísticos necessários para a \
     construção da argumentação.",
    "Competência 5: Elaborar proposta de intervenção para o problema abordado, respeitando os \
     direitos humanos.",
];

pub fn correction(text: &str) -> String {
    format!(
        "A partir dessa redação, existem falhas de gramática e de contexto, \
         me retorne a redação corrigindo essas falhas que não deveriam existir, \
         a redação deve estar completa e com contexto re-estabelecido:\n\n{}",
        text
    )
}

/// Competency critique prompt, with the caller's extra instructions appended.
pub fn competency_evaluation(text: &str, aux_prompt: Option<&str>) -> String {
    let mut prompt = format!(
        "Avalie a redação abaixo segundo as cinco competências do ENEM. \
         Para cada competência, aponte os pontos fortes, os problemas encontrados \
         e atribua uma nota de 0 a 200, justificando-a.\n\n{}\n\nRedação:\n\n{}",
        COMPETENCIES.join("\n"),
        text
    );

    if let Some(aux) = aux_prompt.filter(|a| !a.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(aux);
    }

    prompt
}

pub fn final_score(competency_evaluation: &str) -> String {
    format!(
        "Com base na avaliação por competências abaixo, atribua à redação uma nota final \
         de 0 a 1000, correspondente à soma das notas das cinco competências. \
         Informe a nota final e justifique-a de forma resumida.\n\n\
         Avaliação:\n\n{}",
        competency_evaluation
    )
}

pub fn ai_detection(text: &str) -> String {
    format!(
        "Analise a redação abaixo e classifique se ela foi escrita por uma inteligência \
         artificial ou por um ser humano. Responda com:\n\
         1. Classificação: \"Gerada por IA\" ou \"Escrita por humano\".\n\
         2. Grau de confiança, em porcentagem.\n\
         3. Justificativa, citando as características do texto que embasam a classificação.\n\n\
         Redação:\n\n{}",
        text
    )
}
