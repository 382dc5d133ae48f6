//! Prompt templates. Placeholders are `{name}` and are filled in a single
//! pass, so braces inside substituted values are never re-expanded.

use serde::{Deserialize, Serialize};

/// A system + user message pair sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    pub fn render(&self, values: &[(&str, &str)]) -> ChatPrompt {
        ChatPrompt {
            system: fill(self.system, values),
            user: fill(self.user, values),
        }
    }
}

fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                rendered.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

/// Answer the summarizer returns when the context lacks the field.
pub const NOT_FOUND_ANSWER: &str = "No se encontró información en el documento";

pub const EXTRACTION_SUMMARIZER: PromptTemplate = PromptTemplate {
    system: "Eres un asistente útil. Recibes información del contrato de una licitación y debes \
extraer, de forma resumida, la información de un campo concreto de la licitación.",
    user: "Hay que extraer la información de un Campo del contrato de una licitación. La Definición \
del campo es solo material de apoyo y nunca debe aparecer en la respuesta. Extrae la información del \
Campo a partir del Contexto, que contiene los fragmentos relevantes del contrato, e incluye en la \
respuesta toda la información relevante que encuentres en él. Responde en español. Si la respuesta \
no está disponible, devuelve 'No se encontró información en el documento'. Devuelve la respuesta \
directamente, sin anteponer el nombre del campo.

Campo: {variable}
Definición del campo: {definition}
Contexto: {context}

Respuesta:",
};

pub const QUESTION_REFORMULATION: PromptTemplate = PromptTemplate {
    system: "Eres un asistente útil. Recibes la última pregunta de un usuario junto con sus \
preguntas anteriores. Si la última pregunta necesita contexto, reformúlala con ayuda de las \
anteriores para que se entienda por sí misma. Si ya se entiende por sí misma, devuélvela tal cual.",
    user: "Un usuario está haciendo preguntas a un chatbot. Si la última pregunta necesita \
contexto, reformúlala a partir de las preguntas anteriores para que tenga sentido por sí misma; si \
no, devuélvela tal como la recibes. El historial es una lista en la que los últimos elementos son \
las preguntas más recientes. Devuelve únicamente el texto de la pregunta.

Última pregunta: {question}
Historial de preguntas: {history}

Respuesta:",
};

pub const CHAT_ANSWER: PromptTemplate = PromptTemplate {
    system: "Eres un asistente útil. El usuario te hace una pregunta sobre el contrato de una \
licitación. Respóndela a partir de la información del contrato que se te proporciona, en el \
idioma de la pregunta.",
    user: "Recibes una Pregunta sobre el contrato de una licitación. El Contexto contiene la \
información del contrato necesaria para responderla. Responde siempre con el contexto \
proporcionado y en el idioma de la Pregunta.

Pregunta: {question}
Contexto: {context}

Respuesta:",
};

pub const VALIDATION_ANSWER: PromptTemplate = PromptTemplate {
    system: "Eres un asistente útil. Recibes una instrucción sobre el contrato de una licitación \
junto con fragmentos del contrato. Cumple la instrucción usando únicamente esos fragmentos y \
responde en el idioma de la instrucción.",
    user: "Instrucción: {question}
Contexto: {context}

Respuesta:",
};

pub const JUDGE_SYSTEM: &str = "Eres un evaluador riguroso de sistemas de recuperación y \
generación. Respondes exclusivamente con un objeto JSON válido, sin texto adicional. Los \
campos de texto del JSON van en español.";

pub const JUDGE_CONTEXT_RECALL: PromptTemplate = PromptTemplate {
    system: JUDGE_SYSTEM,
    user: "Dada una pregunta, un contexto y una respuesta de referencia, divide la respuesta de \
referencia en afirmaciones y clasifica cada una: attributed = 1 si puede atribuirse al contexto, \
attributed = 0 si no.

Ejemplo:
Pregunta: ¿Qué me puedes decir sobre Albert Einstein?
Contexto: Albert Einstein (14 de marzo de 1879 - 18 de abril de 1955) fue un físico teórico nacido \
en Alemania. En 1921 recibió el Premio Nobel de Física por sus servicios a la física teórica.
Respuesta: Albert Einstein nació el 14 de marzo de 1879. Recibió el Premio Nobel de Física en \
1921. En 1895 se mudó a Suiza.
Salida: {\"classifications\": [\
{\"statement\": \"Albert Einstein nació el 14 de marzo de 1879.\", \"reason\": \"La fecha de \
nacimiento aparece en el contexto.\", \"attributed\": 1}, \
{\"statement\": \"Recibió el Premio Nobel de Física en 1921.\", \"reason\": \"La frase está en el \
contexto.\", \"attributed\": 1}, \
{\"statement\": \"En 1895 se mudó a Suiza.\", \"reason\": \"El contexto no lo menciona.\", \
\"attributed\": 0}]}

Pregunta: {question}
Contexto: {context}
Respuesta: {reference}
Salida:",
};

pub const JUDGE_CONTEXT_PRECISION: PromptTemplate = PromptTemplate {
    system: JUDGE_SYSTEM,
    user: "Dada una pregunta, una respuesta de referencia y un fragmento de contexto, indica si \
el fragmento fue útil para llegar a la respuesta: verdict = 1 si lo fue, verdict = 0 si no.

Ejemplo:
Pregunta: ¿Cuál es la montaña más alta del mundo?
Contexto: Los Andes son la cordillera continental más larga del mundo, situada en Sudamérica.
Respuesta: El Monte Everest.
Salida: {\"reason\": \"El contexto habla de los Andes y no menciona el Monte Everest.\", \
\"verdict\": 0}

Pregunta: {question}
Contexto: {context}
Respuesta: {reference}
Salida:",
};

pub const JUDGE_STATEMENTS: PromptTemplate = PromptTemplate {
    system: JUDGE_SYSTEM,
    user: "Dada una pregunta y una respuesta, descompón la respuesta en afirmaciones simples y \
autocontenidas, sin pronombres.

Ejemplo:
Pregunta: ¿Quién fue Albert Einstein?
Respuesta: Fue un físico teórico nacido en Alemania, conocido por la teoría de la relatividad.
Salida: {\"statements\": [\"Albert Einstein fue un físico teórico nacido en Alemania.\", \
\"Albert Einstein es conocido por desarrollar la teoría de la relatividad.\"]}

Pregunta: {question}
Respuesta: {answer}
Salida:",
};

pub const JUDGE_FAITHFULNESS: PromptTemplate = PromptTemplate {
    system: JUDGE_SYSTEM,
    user: "Dado un contexto y una lista de afirmaciones, decide para cada afirmación si se deduce \
directamente del contexto: verdict = 1 si se deduce, verdict = 0 si no.

Ejemplo:
Contexto: John estudia Ciencias de la Computación en la Universidad XYZ y pasa muchas horas en \
la biblioteca.
Afirmaciones: [\"John está especializándose en Biología.\", \"John es un estudiante dedicado.\"]
Salida: {\"statements\": [\
{\"statement\": \"John está especializándose en Biología.\", \"reason\": \"Su carrera es Ciencias \
de la Computación.\", \"verdict\": 0}, \
{\"statement\": \"John es un estudiante dedicado.\", \"reason\": \"Pasa muchas horas estudiando \
en la biblioteca.\", \"verdict\": 1}]}

Contexto: {context}
Afirmaciones: {statements}
Salida:",
};

pub const JUDGE_RESPONSE_RELEVANCE: PromptTemplate = PromptTemplate {
    system: JUDGE_SYSTEM,
    user: "Genera la pregunta a la que responde la siguiente respuesta e indica si la respuesta es \
evasiva: noncommittal = 1 si es evasiva o ambigua (por ejemplo 'no lo sé'), noncommittal = 0 si \
es concreta.

Ejemplo:
Respuesta: Albert Einstein nació en Alemania.
Salida: {\"question\": \"¿Dónde nació Albert Einstein?\", \"noncommittal\": 0}

Respuesta: {answer}
Salida:",
};

/// JSON list of the questions, oldest first.
pub fn render_history(questions: &[&str]) -> String {
    serde_json::Value::from(questions.to_vec()).to_string()
}

pub fn extraction_prompt(variable: &str, definition: &str, context: &str) -> ChatPrompt {
    EXTRACTION_SUMMARIZER.render(&[
        ("variable", variable),
        ("definition", definition),
        ("context", context),
    ])
}

pub fn reformulation_prompt(question: &str, history: &[&str]) -> ChatPrompt {
    let history = render_history(history);
    QUESTION_REFORMULATION.render(&[("question", question), ("history", &history)])
}

pub fn chat_prompt(question: &str, context: &str) -> ChatPrompt {
    CHAT_ANSWER.render(&[("question", question), ("context", context)])
}

pub fn validation_prompt(question: &str, context: &str) -> ChatPrompt {
    VALIDATION_ANSWER.render(&[("question", question), ("context", context)])
}
