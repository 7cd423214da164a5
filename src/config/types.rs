use serde::Deserialize;

/// Main configuration structure for the TRF5 crawler
///
/// Every section is optional; an empty file yields the defaults used
/// against the live site.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub limits: LimitsConfig,
    pub pagination: PaginationConfig,
    pub classifier: ClassifierConfig,
    pub links: LinkConfig,
    pub output: OutputConfig,
}

/// Target site addressing and politeness
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Address of the search form page
    pub base_url: String,

    /// Stable enumeration route; `{party}` and `{page}` are substituted
    pub stable_route: String,

    /// Form field selecting the kind of search
    pub search_type_field: String,

    /// Form field carrying the searched value
    pub search_value_field: String,

    /// Value of the search type field for case-number searches
    pub identifier_search_type: String,

    /// Load the form before submitting it (keeps session tokens)
    pub preload_form: bool,

    pub user_agent: String,

    /// Default per-request timeout (seconds)
    pub request_timeout_secs: f64,

    /// Minimum delay between two requests of the same job (milliseconds)
    pub download_delay_ms: u64,

    pub obey_robots: bool,

    pub max_redirects: usize,

    /// Number of jobs of one session running at the same time
    pub max_concurrent_jobs: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www5.trf5.jus.br/cp/".to_string(),
            stable_route: "https://www5.trf5.jus.br/cp/processo/cpf/porData/ativos/{party}/{page}"
                .to_string(),
            search_type_field: "tipo".to_string(),
            search_value_field: "filtro".to_string(),
            identifier_search_type: "xmlproc".to_string(),
            preload_form: true,
            user_agent: "trf5-crawler/0.1 (+https://github.com/trf5-crawler)".to_string(),
            request_timeout_secs: 30.0,
            download_delay_ms: 700,
            obey_robots: true,
            max_redirects: 5,
            max_concurrent_jobs: 1,
        }
    }
}

/// Retry policy knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    pub retryable_status_codes: Vec<u16>,

    /// Lower-case phrases that turn a 200 response into a content failure
    pub content_error_phrases: Vec<String>,

    /// Global retry ceiling for endpoint classes without an override
    pub max_retries: u32,

    pub initial_delay_secs: f64,
    pub backoff_multiplier: f64,
    pub max_delay_secs: f64,
    pub jitter: bool,

    /// Upper bound for widened timeouts while degraded (seconds)
    pub max_timeout_secs: f64,

    /// Bodies shorter than this after trimming are content failures
    pub min_body_chars: usize,

    /// Bodies with less visible text than this are content failures
    pub min_text_chars: usize,

    pub endpoints: EndpointOverrides,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retryable_status_codes: vec![500, 502, 503, 504, 408, 429],
            content_error_phrases: [
                "erro interno do servidor",
                "sistema temporariamente indisponível",
                "manutenção programada",
                "service unavailable",
                "gateway timeout",
                "connection timed out",
                "erro 5",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_retries: 5,
            initial_delay_secs: 1.0,
            backoff_multiplier: 2.0,
            max_delay_secs: 60.0,
            jitter: true,
            max_timeout_secs: 120.0,
            min_body_chars: 100,
            min_text_chars: 50,
            endpoints: EndpointOverrides::default(),
        }
    }
}

/// Per endpoint class retry overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EndpointOverrides {
    pub form: Option<EndpointPolicy>,
    pub detail: Option<EndpointPolicy>,
    pub list: Option<EndpointPolicy>,
    pub stable_route: Option<EndpointPolicy>,
}

impl Default for EndpointOverrides {
    fn default() -> Self {
        Self {
            form: Some(EndpointPolicy::new(3, 1.5, 1.2)),
            detail: Some(EndpointPolicy::new(4, 1.0, 1.0)),
            list: Some(EndpointPolicy::new(5, 2.0, 1.5)),
            stable_route: Some(EndpointPolicy::new(6, 0.8, 0.9)),
        }
    }
}

/// Retry ceiling and multipliers for one endpoint class
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EndpointPolicy {
    pub max_retries: u32,
    #[serde(default = "unit_multiplier")]
    pub delay_multiplier: f64,
    #[serde(default = "unit_multiplier")]
    pub timeout_multiplier: f64,
}

fn unit_multiplier() -> f64 {
    1.0
}

impl EndpointPolicy {
    pub fn new(max_retries: u32, delay_multiplier: f64, timeout_multiplier: f64) -> Self {
        Self {
            max_retries,
            delay_multiplier,
            timeout_multiplier,
        }
    }
}

/// Server health assessment
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HealthConfig {
    /// Capacity of the sliding outcome window
    pub window_size: usize,

    /// Outcomes required before degradation is evaluated
    pub min_samples: usize,

    /// Number of most recent outcomes used for the failure rate
    pub recent_window: usize,

    pub failure_rate_threshold: f64,
    pub max_consecutive_failures: u32,

    /// Seconds without a success after which the server counts as degraded
    pub max_silence_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            min_samples: 10,
            recent_window: 20,
            failure_rate_threshold: 0.5,
            max_consecutive_failures: 5,
            max_silence_secs: 300,
        }
    }
}

/// Default job limits; command-line values take precedence
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimitsConfig {
    pub max_pages: Option<u32>,
    pub max_details_per_page: Option<u32>,
}

/// Pagination planning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PaginationConfig {
    pub page_size: u32,

    /// Query parameter carrying the page index in navigation links
    pub page_param: String,

    /// Pages guessed sequentially when a list page has no navigation signal
    pub sequential_bound: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            page_param: "page".to_string(),
            sequential_bound: 5,
        }
    }
}

/// Token sets of the page classifier (case-insensitive regular expressions)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClassifierConfig {
    pub process_label: Vec<String>,
    pub rapporteur: Vec<String>,
    pub party_roles: Vec<String>,
    pub timeline: Vec<String>,
    pub judge: Vec<String>,
    pub count_phrases: Vec<String>,
    pub navigation: Vec<String>,
    pub error_phrases: Vec<String>,
    pub case_number: String,
    pub min_body_chars: usize,

    /// Classify well-formed pages matching no rule as Error instead of Unknown
    pub strict_error_fallback: bool,
}

fn patterns(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            process_label: patterns(&[r"PROCESSO\s+N[°ºo]", r"N[°ºo]\s+DO\s+PROCESSO"]),
            rapporteur: patterns(&[r"\bRELATORA?\b"]),
            party_roles: patterns(&[
                r"\bAPT[EO]\b",
                r"\bAPD[AO]\b",
                r"\bAPELANTE\b",
                r"\bAPELAD[AO]\b",
                r"\bAUTORA?\b",
                r"\bR[EÉ]U\b",
                r"\bADVOGAD[AO]\b",
                r"\bPROCURADORA?\b",
                r"\bPART[EI]\b",
                r"\bREQUERENTE\b",
                r"\bREQUERID[AO]\b",
            ]),
            timeline: patterns(&[
                r"MOVIMENTA[ÇC][ÃA]O",
                r"\bMOVIMENTOS?\b",
                r"\bANDAMENTOS?\b",
                r"\d{1,2}/\d{1,2}/\d{4}",
                r"PETICIONAMENTO",
                r"\bJUNTADA\b",
                r"PUBLICA[ÇC][ÃA]O",
                r"\bAUTUAD[AO]\b",
            ]),
            judge: patterns(&[
                r"\bRELATORA?\b",
                r"\bJU[IÍ]ZA?\b",
                r"\bDESEMBARGADORA?\b",
                r"\bMAGISTRADA?\b",
            ]),
            count_phrases: patterns(&[r"Total:\s*\d+"]),
            navigation: patterns(&[
                r"\bpr[óo]xim[ao]\b",
                r"[úu]ltima\b",
                r"\bprimeira\b",
                r"\banterior\b",
                r"\bp[áa]gina\s*\d+",
            ]),
            error_phrases: patterns(&[
                r"NENHUM\s+RESULTADO",
                r"N[ÃA]O\s+FORAM?\s+ENCONTRAD[OA]S?",
                r"RESULTADO\s+N[ÃA]O\s+ENCONTRADO",
                r"SEM\s+RESULTADOS?",
                r"BUSCA\s+SEM\s+RETORNO",
                r"CONSULTA\s+SEM\s+RESULTADO",
                r"ERRO\s+\d+",
                r"P[ÁA]GINA\s+N[ÃA]O\s+ENCONTRADA",
                r"ACESSO\s+NEGADO",
                r"SERVI[ÇC]O\s+INDISPON[ÍI]VEL",
                r"SISTEMA\s+FORA\s+DO\s+AR",
                r"MANUTEN[ÇC][ÃA]O",
            ]),
            case_number: r"\d{7}-\d{2}\.\d{4}\.\d\.\d{2}\.\d{4}".to_string(),
            min_body_chars: 100,
            strict_error_fallback: true,
        }
    }
}

/// Detail link recognition
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LinkConfig {
    /// Lower-case href fragments marking a case detail resource
    pub detail_markers: Vec<String>,

    /// Lower-case href fragments marking sub-resources of a case
    pub sub_resource_markers: Vec<String>,

    /// CSS selectors scanned in order when disambiguating search results
    pub selector_strategies: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            detail_markers: patterns(&["processo", "detalhe"]),
            sub_resource_markers: patterns(&[
                "movimenta",
                "andamento",
                "timeline",
                "historico",
                "mov_",
            ]),
            selector_strategies: patterns(&["table a[href]", "a[href]"]),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./trf5.db".to_string(),
        }
    }
}
