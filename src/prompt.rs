use crate::locale::Locale;

/// The two messages sent to the completion endpoint, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

struct Labels {
    overview: &'static str,
    overview_hint: &'static str,
    features: &'static str,
    feature_hints: [&'static str; 3],
    feature_count: &'static str,
    history: &'static str,
    history_hint: &'static str,
    status: &'static str,
    recent: &'static str,
    recent_hint: &'static str,
    applications: &'static str,
    applications_hint: &'static str,
    impact: &'static str,
    impact_hint: &'static str,
    outlook: &'static str,
    outlook_hint: &'static str,
    related: &'static str,
    fields: &'static str,
    fields_hint: &'static str,
    references: &'static str,
    references_hint: &'static str,
}

const ZH_LABELS: Labels = Labels {
    overview: "基本概述",
    overview_hint: "100字以内的简明概括",
    features: "核心特征",
    feature_hints: [
        "关键特征1，支持证据",
        "关键特征2，支持证据",
        "关键特征3，支持证据",
    ],
    feature_count: "至少3点，最多5点",
    history: "发展历程",
    history_hint: "按时间顺序列出重要事件和里程碑",
    status: "现状分析",
    recent: "最新进展",
    recent_hint: "最近6个月内的最新发展",
    applications: "应用场景",
    applications_hint: "当前的实际应用和用例",
    impact: "行业影响",
    impact_hint: "对相关行业和领域的影响",
    outlook: "未来展望",
    outlook_hint: "未来趋势和潜在发展",
    related: "相关信息",
    fields: "关联领域",
    fields_hint: "相关领域和概念列表",
    references: "参考来源",
    references_hint: "权威来源和最近出版物列表",
};

const EN_LABELS: Labels = Labels {
    overview: "Overview",
    overview_hint: "Concise summary within 100 words",
    features: "Key Features",
    feature_hints: [
        "Key feature 1 with supporting evidence",
        "Key feature 2 with supporting evidence",
        "Key feature 3 with supporting evidence",
    ],
    feature_count: "Minimum 3, maximum 5 points",
    history: "Development History",
    history_hint: "Chronological development with specific dates and milestones",
    status: "Current Status",
    recent: "Recent Developments",
    recent_hint: "Recent developments within the last 6 months",
    applications: "Applications",
    applications_hint: "Current real-world applications and use cases",
    impact: "Industry Impact",
    impact_hint: "Impact on relevant industries and domains",
    outlook: "Future Outlook",
    outlook_hint: "Future trends and potential developments",
    related: "Related Information",
    fields: "Related Fields",
    fields_hint: "List of related fields and concepts",
    references: "References",
    references_hint: "List of authoritative sources and recent publications",
};

fn labels(locale: Locale) -> &'static Labels {
    match locale {
        Locale::Zh => &ZH_LABELS,
        Locale::En => &EN_LABELS,
    }
}

pub fn build_system_prompt(locale: Locale) -> String {
    format!(
        "You are a professional research assistant with access to the latest information. Always verify facts and cite sources. Respond in {lang} but process instructions in English for better accuracy.",
        lang = locale.output_language(),
    )
}

pub fn build_user_prompt(topic: &str, locale: Locale) -> String {
    let l = labels(locale);
    let [f1, f2, f3] = l.feature_hints;
    format!(
        "You are a knowledgeable research assistant. Please provide a comprehensive analysis of \"{topic}\" with the latest information from reliable sources. Structure your response in {lang} using the following format:\n\n\
# {topic}\n\n\
## {overview}\n[{overview_hint}]\n\n\
## {features}\n- [{f1}]\n- [{f2}]\n- [{f3}]\n({feature_count})\n\n\
## {history}\n[{history_hint}]\n\n\
## {status}\n### {recent}\n[{recent_hint}]\n\n### {applications}\n[{applications_hint}]\n\n### {impact}\n[{impact_hint}]\n\n\
## {outlook}\n[{outlook_hint}]\n\n\
## {related}\n### {fields}\n[{fields_hint}]\n\n### {references}\n[{references_hint}]\n\n\
Requirements:\n\
1. Focus on accuracy and recency of information\n\
2. Include specific dates and statistics where relevant\n\
3. Prioritize factual information from authoritative sources\n\
4. Maintain clear structure with proper Markdown formatting\n\
5. Keep total response within 4096 tokens",
        topic = topic,
        lang = locale.output_language(),
        overview = l.overview,
        overview_hint = l.overview_hint,
        features = l.features,
        feature_count = l.feature_count,
        history = l.history,
        history_hint = l.history_hint,
        status = l.status,
        recent = l.recent,
        recent_hint = l.recent_hint,
        applications = l.applications,
        applications_hint = l.applications_hint,
        impact = l.impact,
        impact_hint = l.impact_hint,
        outlook = l.outlook,
        outlook_hint = l.outlook_hint,
        related = l.related,
        fields = l.fields,
        fields_hint = l.fields_hint,
        references = l.references,
        references_hint = l.references_hint,
    )
}

/// Builds the system/user pair for a topic. Pure: identical inputs always
/// produce identical strings.
pub fn build_prompt(topic: &str, locale: Locale) -> Prompt {
    let topic = topic.trim();
    Prompt {
        system: build_system_prompt(locale),
        user: build_user_prompt(topic, locale),
    }
}
